//! Authentication module for resolving credentials and managing sessions.
//!
//! This module provides:
//! - `CredentialResolver`: produces one credential from an ordered list of sources
//! - `SessionStore`: persisted session tokens keyed by server identity
//! - `AuthFile` / `LegacyTokenFile`: the `USERNAME::SECRET` files on disk
//!
//! Sessions carry no local expiry. The server owns session lifetime and
//! reports a dead session through an API error, which the API client reacts to.

pub mod credentials;
pub mod files;
pub mod session;

pub use credentials::{
    Credential, CredentialError, CredentialResolver, CredentialSource, Prompter, ResolveOptions,
    ResolvedCredential,
};
pub use files::{AuthFile, LegacyTokenFile};
pub use session::{ServerIdentity, Session, SessionStore, SessionStoreError};
