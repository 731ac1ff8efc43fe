//! Recognizing "your session is gone" among server errors.
//!
//! The wording differs between server versions and locales, so the
//! signature is data (`[app.session_expiry]`) rather than a fixed string.
//! Matching is conservative: an error must hit both a listed code and a
//! listed pattern, and an empty pattern list matches nothing.

use serde::Deserialize;

use super::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExpirySignature {
    /// JSON-RPC error codes that may carry an expiry. Empty means any code.
    pub codes: Vec<i64>,
    /// Case-insensitive substrings looked for in the error message and data.
    pub patterns: Vec<String>,
}

impl Default for ExpirySignature {
    fn default() -> Self {
        Self {
            codes: vec![-32602, -32500],
            patterns: vec![
                "re-login".to_string(),
                "session terminated".to_string(),
                "not authorized".to_string(),
            ],
        }
    }
}

impl ExpirySignature {
    pub fn matches(&self, code: i64, message: &str, data: &str) -> bool {
        if !self.codes.is_empty() && !self.codes.contains(&code) {
            return false;
        }
        let message = message.to_lowercase();
        let data = data.to_lowercase();
        self.patterns
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .any(|p| message.contains(&p) || data.contains(&p))
    }
}

/// What the caller may do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The session is dead; one re-authentication may fix it.
    SessionExpired,
    /// Anything else. Propagated as-is.
    Terminal,
}

pub fn classify(error: &ApiError, signature: &ExpirySignature) -> ErrorKind {
    match error {
        ApiError::Rpc {
            code,
            message,
            data,
        } if signature.matches(*code, message, data) => ErrorKind::SessionExpired,
        _ => ErrorKind::Terminal,
    }
}
