//! JSON-RPC client module for the Zabbix API.
//!
//! This module provides the `ApiClient` for calling API methods against a
//! single server, along with version handling and error classification.
//!
//! Older servers take the session token as an `auth` member of the request
//! body; 6.4 and later take it as a bearer token header. The server version
//! is queried once and fixes the transport for the life of the client.

pub mod client;
pub mod error;
pub mod expiry;
pub mod version;

pub use client::ApiClient;
pub use error::ApiError;
pub use expiry::{classify, ErrorKind, ExpirySignature};
pub use version::{ApiVersion, AuthTransport};
