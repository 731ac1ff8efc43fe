//! Bulk command execution.
//!
//! A bulk file holds one command per line. Lines run strictly in file order,
//! one at a time, because later commands usually depend on what earlier ones
//! created. Nothing is rolled back: when a run stops early, the lines before
//! it have already taken effect on the server.

pub mod executor;
pub mod line;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::api::ApiError;

pub use executor::{BulkExecutor, BulkResult, BulkSummary, LineRecord, Outcome};
pub use line::CommandLine;

/// How failures affect the rest of a bulk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkMode {
    /// Stop at the first parse or execution failure.
    #[default]
    Strict,
    /// Record failures and keep going.
    Continue,
    /// Ignore per-line failures entirely.
    Skip,
}

impl BulkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkMode::Strict => "strict",
            BulkMode::Continue => "continue",
            BulkMode::Skip => "skip",
        }
    }
}

impl fmt::Display for BulkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(BulkMode::Strict),
            "continue" => Ok(BulkMode::Continue),
            "skip" => Ok(BulkMode::Skip),
            other => Err(format!(
                "invalid bulk mode '{other}', expected one of: strict, continue, skip"
            )),
        }
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    /// The line could not be understood as a command.
    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl From<ApiError> for CommandError {
    fn from(err: ApiError) -> Self {
        CommandError::Execution(err.into())
    }
}

#[derive(Error, Debug)]
pub enum BulkError {
    #[error("Could not read command file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Runs one command on behalf of the bulk executor.
///
/// The executor knows nothing about what commands mean, only whether they
/// succeeded.
#[async_trait]
pub trait CommandDispatcher: Send {
    async fn execute(&mut self, command: &str, args: &[String]) -> Result<(), CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_mode_from_str() {
        assert_eq!("strict".parse::<BulkMode>(), Ok(BulkMode::Strict));
        assert_eq!(" Continue ".parse::<BulkMode>(), Ok(BulkMode::Continue));
        assert_eq!("SKIP".parse::<BulkMode>(), Ok(BulkMode::Skip));
        assert!("sometimes".parse::<BulkMode>().is_err());
        assert_eq!(BulkMode::default(), BulkMode::Strict);
        assert_eq!(BulkMode::Skip.to_string(), "skip");
    }
}
