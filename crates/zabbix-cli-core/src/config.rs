//! Application configuration management.
//!
//! Configuration is a TOML file looked up in this order:
//! 1. an explicit path (`--config`)
//! 2. `./zabbix-cli.toml`
//! 3. `~/.config/zabbix-cli/zabbix-cli.toml`
//!
//! A missing file yields defaults. Keys from the 2.x configuration format are
//! accepted as aliases so old files keep working.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::api::ExpirySignature;
use crate::bulk::BulkMode;

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "zabbix-cli";

/// Config file name
pub const CONFIG_FILE: &str = "zabbix-cli.toml";

const SESSION_FILE: &str = ".zabbix-cli_session.json";
const AUTH_TOKEN_FILE: &str = ".zabbix-cli_auth_token";
const AUTH_FILE: &str = ".zabbix-cli_auth";
const LOG_FILE: &str = "zabbix-cli.log";

/// HTTP timeout used when `api.timeout` is 0.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("No Zabbix URL configured. Set api.url or ZABBIX_URL")]
    NoUrl,

    #[error("Invalid Zabbix URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "zabbix_api")]
    pub api: ApiConfig,
    #[serde(alias = "zabbix_config")]
    pub app: AppConfig,
    pub logging: LoggingConfig,
    /// File the configuration was loaded from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    #[serde(alias = "zabbix_api_url")]
    pub url: String,
    #[serde(alias = "system_id")]
    pub username: String,
    pub password: String,
    pub auth_token: String,
    #[serde(alias = "cert_verify")]
    pub verify_ssl: bool,
    /// Per-request timeout in seconds; 0 selects the default.
    pub timeout: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            auth_token: String::new(),
            verify_ssl: true,
            timeout: 0,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        match self.timeout {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(alias = "use_auth_token_file")]
    pub use_session_file: bool,
    pub session_file: PathBuf,
    /// Single-entry `USERNAME::TOKEN` file written by older releases.
    pub auth_token_file: PathBuf,
    /// `USERNAME::PASSWORD` file.
    pub auth_file: PathBuf,
    #[serde(alias = "allow_insecure_authfile")]
    pub allow_insecure_auth_file: bool,
    /// Write prompted credentials to `auth_file` after a successful login.
    pub save_auth_file: bool,
    pub bulk_mode: BulkMode,
    pub session_expiry: ExpirySignature,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data = data_dir();
        Self {
            use_session_file: true,
            session_file: data.join(SESSION_FILE),
            auth_token_file: data.join(AUTH_TOKEN_FILE),
            auth_file: data.join(AUTH_FILE),
            allow_insecure_auth_file: false,
            save_auth_file: false,
            bulk_mode: BulkMode::default(),
            session_expiry: ExpirySignature::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(alias = "logging", alias = "enable")]
    pub enabled: bool,
    pub log_level: String,
    /// An empty string disables the log file and logs to stderr.
    #[serde(deserialize_with = "empty_path_is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            log_file: Some(data_dir().join("logs").join(LOG_FILE)),
        }
    }
}

fn empty_path_is_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()).map(PathBuf::from))
}

impl Config {
    /// Load configuration, searching the default locations if `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.exists()),
        };

        match candidate {
            Some(path) => Self::from_file(&path),
            None => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.config_path = Some(path.to_path_buf());
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(APP_NAME).join(CONFIG_FILE));
        }
        paths
    }
}

/// Directory for session, auth and log files.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.api.verify_ssl);
        assert!(config.app.use_session_file);
        assert!(!config.app.allow_insecure_auth_file);
        assert_eq!(config.app.bulk_mode, BulkMode::Strict);
        assert_eq!(config.api.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(config.app.session_file.ends_with(SESSION_FILE));
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
            [api]
            url = "https://zabbix.example.com"
            username = "Admin"
            auth_token = "abc"
            timeout = 5

            [app]
            use_session_file = false
            session_file = "/tmp/sessions.json"
            bulk_mode = "continue"

            [app.session_expiry]
            codes = [-32602]
            patterns = ["re-login"]

            [logging]
            log_level = "debug"
            log_file = ""
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.api.url, "https://zabbix.example.com");
        assert_eq!(config.api.auth_token, "abc");
        assert_eq!(config.api.timeout(), Duration::from_secs(5));
        assert!(!config.app.use_session_file);
        assert_eq!(config.app.session_file, PathBuf::from("/tmp/sessions.json"));
        assert_eq!(config.app.bulk_mode, BulkMode::Continue);
        assert_eq!(config.app.session_expiry.codes, vec![-32602]);
        assert_eq!(config.logging.log_file, None);
    }

    #[test]
    fn test_legacy_aliases() {
        let toml = r#"
            [zabbix_api]
            zabbix_api_url = "https://old.example.com"
            system_id = "legacy"
            cert_verify = false

            [zabbix_config]
            use_auth_token_file = false
            allow_insecure_authfile = true
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.api.url, "https://old.example.com");
        assert_eq!(config.api.username, "legacy");
        assert!(!config.api.verify_ssl);
        assert!(!config.app.use_session_file);
        assert!(config.app.allow_insecure_auth_file);
    }

    #[test]
    fn test_invalid_bulk_mode_rejected() {
        let toml = "[app]\nbulk_mode = \"sometimes\"\n";
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/zabbix-cli.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
