use thiserror::Error;

use crate::auth::CredentialError;
use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Error object returned by the server.
    #[error("Error {code}: {message}: {data}")]
    Rpc {
        code: i64,
        message: String,
        data: String,
    },

    #[error("Session for {identity} expired again after re-authenticating. Please log in again")]
    SessionExpired { identity: String },

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        ApiError::Http {
            status,
            body: Self::truncate_body(body),
        }
    }

    /// Server-reported error code, if this is a JSON-RPC error.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            ApiError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}
