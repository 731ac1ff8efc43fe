//! Explicit application context.
//!
//! A `Context` is built once at startup and handed to each component
//! (resolver, API client, bulk executor). Components never read process
//! globals directly, so every one of them can be driven by a fake context
//! in tests.

use std::collections::HashMap;

use crate::auth::ServerIdentity;
use crate::config::{Config, ConfigError};

/// Environment variable holding the server URL.
pub const ENV_URL: &str = "ZABBIX_URL";
/// Environment variable holding the login username.
pub const ENV_USERNAME: &str = "ZABBIX_USERNAME";
/// Environment variable holding the login password.
pub const ENV_PASSWORD: &str = "ZABBIX_PASSWORD";
/// Environment variable holding a static API token.
pub const ENV_API_TOKEN: &str = "ZABBIX_API_TOKEN";

const TRACKED_VARS: [&str; 4] = [ENV_URL, ENV_USERNAME, ENV_PASSWORD, ENV_API_TOKEN];

/// Snapshot of the environment variables this crate consumes.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the tracked variables from the running process.
    pub fn from_process() -> Self {
        let vars = TRACKED_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self { vars }
    }

    /// Build an environment from explicit pairs (used by tests and embedders).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Get a variable, treating empty values as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }
}

/// Everything a component needs to know about this invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub env: Environment,
    /// Whether a human is attached to the terminal. Gates the password prompt.
    pub interactive: bool,
}

impl Context {
    pub fn new(config: Config, env: Environment, interactive: bool) -> Self {
        Self {
            config,
            env,
            interactive,
        }
    }

    /// The server URL: `ZABBIX_URL` wins over the configuration file.
    pub fn server_url(&self) -> Result<String, ConfigError> {
        self.env
            .get(ENV_URL)
            .map(str::to_string)
            .or_else(|| Some(self.config.api.url.trim().to_string()).filter(|u| !u.is_empty()))
            .ok_or(ConfigError::NoUrl)
    }

    /// Normalized identity of the target server.
    pub fn server_identity(&self) -> Result<ServerIdentity, ConfigError> {
        let url = self.server_url()?;
        ServerIdentity::parse(&url).map_err(|e| ConfigError::InvalidUrl {
            url,
            reason: e.to_string(),
        })
    }
}
