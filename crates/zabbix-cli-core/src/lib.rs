//! Core library for zabbix-cli.
//!
//! This crate provides:
//! - `auth`: ordered credential resolution, auth files and the persisted session store
//! - `api`: the JSON-RPC client with version-dependent auth transport and
//!   one-shot re-authentication on session expiry
//! - `bulk`: line parsing and the sequential bulk command executor
//! - `config` / `context`: TOML configuration and the explicit application context
//!
//! Front ends (the `zabbix-cli` binary, plugins) consume `ApiClient` and
//! implement `CommandDispatcher`; nothing in here renders output.

pub mod api;
pub mod auth;
pub mod bulk;
pub mod config;
pub mod context;

pub use api::{ApiClient, ApiError};
pub use auth::{Credential, CredentialResolver, SessionStore};
pub use bulk::{BulkExecutor, BulkMode, BulkResult, CommandDispatcher, CommandError};
pub use config::Config;
pub use context::{Context, Environment};
