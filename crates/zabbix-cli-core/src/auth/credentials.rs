//! Ordered credential resolution.
//!
//! Sources are tried in a fixed order and the first one that yields a
//! *complete* credential wins; sources are never merged:
//!
//! 1. API token from the configuration file
//! 2. API token from `ZABBIX_API_TOKEN`
//! 3. Persisted session token (session store, then the legacy token file)
//! 4. Username and password from the configuration file
//! 5. Username and password from the auth file
//! 6. Username and password from `ZABBIX_USERNAME` / `ZABBIX_PASSWORD`
//! 7. Interactive prompt
//!
//! A configured username without a password only seeds the prompt default.
//! Later sources are not consulted once one has produced a credential.

use std::fmt;
use std::io;

use thiserror::Error;
use tracing::{debug, warn};

use super::files::{AuthFile, LegacyTokenFile};
use super::session::{ServerIdentity, SessionStore};
use crate::config::{ApiConfig, AppConfig};
use crate::context::{Context, Environment, ENV_API_TOKEN, ENV_PASSWORD, ENV_USERNAME};

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiToken(String),
    UsernamePassword { username: String, password: String },
    /// A session token obtained by an earlier login.
    Session { username: String, token: String },
}

impl Credential {
    pub fn username(&self) -> Option<&str> {
        match self {
            Credential::ApiToken(_) => None,
            Credential::UsernamePassword { username, .. } | Credential::Session { username, .. } => {
                Some(username.as_str())
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ApiToken(_) => "API token",
            Credential::UsernamePassword { .. } => "username and password",
            Credential::Session { .. } => "session token",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiToken(_) => f.write_str("ApiToken(<redacted>)"),
            Credential::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::Session { username, .. } => f
                .debug_struct("Session")
                .field("username", username)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ConfigFile,
    Environment,
    SessionStore,
    LegacyTokenFile,
    AuthFile,
    Prompt,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialSource::ConfigFile => "config file",
            CredentialSource::Environment => "environment",
            CredentialSource::SessionStore => "session file",
            CredentialSource::LegacyTokenFile => "auth token file",
            CredentialSource::AuthFile => "auth file",
            CredentialSource::Prompt => "prompt",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub source: CredentialSource,
}

impl ResolvedCredential {
    fn new(credential: Credential, source: CredentialSource) -> Self {
        Self { credential, source }
    }
}

impl fmt::Display for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.credential.kind(), self.source)
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No credentials found for {url}. Configure an API token or username and password")]
    NoCredentialFound { url: String },

    #[error("Unable to read {field} from prompt: {source}")]
    Prompt {
        field: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0} cannot be empty")]
    EmptyInput(&'static str),
}

/// Terminal interaction for the last-resort credential source.
pub trait Prompter: Send {
    /// Ask for a username, showing `default` if one is configured.
    fn prompt_username(&mut self, default: Option<&str>) -> io::Result<String>;

    /// Ask for a password without echoing it.
    fn prompt_password(&mut self) -> io::Result<String>;
}

/// Which sources a resolution pass may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Consult persisted session tokens (source 3).
    pub use_persisted_session: bool,
    /// Fall back to the interactive prompt (source 7).
    pub allow_prompt: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            use_persisted_session: true,
            allow_prompt: true,
        }
    }
}

pub struct CredentialResolver {
    identity: ServerIdentity,
    api: ApiConfig,
    app: AppConfig,
    env: Environment,
    interactive: bool,
    prompter: Option<Box<dyn Prompter>>,
}

impl CredentialResolver {
    pub fn new(ctx: &Context, identity: ServerIdentity, prompter: Option<Box<dyn Prompter>>) -> Self {
        Self {
            identity,
            api: ctx.config.api.clone(),
            app: ctx.config.app.clone(),
            env: ctx.env.clone(),
            interactive: ctx.interactive,
            prompter,
        }
    }

    /// Whether the prompt source can actually reach a human.
    pub fn is_interactive(&self) -> bool {
        self.interactive && self.prompter.is_some()
    }

    /// Resolve a credential using every source.
    pub fn resolve(&mut self, store: Option<&SessionStore>) -> Result<ResolvedCredential, CredentialError> {
        self.resolve_with(store, ResolveOptions::default())
    }

    pub fn resolve_with(
        &mut self,
        store: Option<&SessionStore>,
        options: ResolveOptions,
    ) -> Result<ResolvedCredential, CredentialError> {
        let found = self
            .api_token_from_config()
            .or_else(|| self.api_token_from_env())
            .or_else(|| {
                if options.use_persisted_session {
                    self.persisted_session(store)
                } else {
                    None
                }
            })
            .or_else(|| self.password_from_config())
            .or_else(|| self.password_from_auth_file())
            .or_else(|| self.password_from_env());

        if let Some(resolved) = found {
            debug!(credential = %resolved, "Resolved credentials");
            return Ok(resolved);
        }

        if options.allow_prompt && self.is_interactive() {
            return self.password_from_prompt();
        }

        Err(CredentialError::NoCredentialFound {
            url: self.identity.to_string(),
        })
    }

    /// Username from configuration or environment, used for matching
    /// persisted sessions and as the prompt default.
    fn configured_username(&self) -> Option<&str> {
        non_empty(&self.api.username).or_else(|| self.env.get(ENV_USERNAME))
    }

    fn api_token_from_config(&self) -> Option<ResolvedCredential> {
        non_empty(&self.api.auth_token).map(|token| {
            ResolvedCredential::new(Credential::ApiToken(token.to_string()), CredentialSource::ConfigFile)
        })
    }

    fn api_token_from_env(&self) -> Option<ResolvedCredential> {
        self.env.get(ENV_API_TOKEN).map(|token| {
            ResolvedCredential::new(Credential::ApiToken(token.to_string()), CredentialSource::Environment)
        })
    }

    fn persisted_session(&self, store: Option<&SessionStore>) -> Option<ResolvedCredential> {
        if !self.app.use_session_file {
            return None;
        }
        let configured = self.configured_username();

        if let Some(session) = store.and_then(|s| s.get(&self.identity)) {
            match configured {
                Some(user) if user != session.username => {
                    debug!(
                        stored = %session.username,
                        configured = %user,
                        "Ignoring stored session for a different user"
                    );
                }
                _ if session.token.is_empty() => {}
                _ => {
                    return Some(ResolvedCredential::new(
                        Credential::Session {
                            username: session.username.clone(),
                            token: session.token.clone(),
                        },
                        CredentialSource::SessionStore,
                    ));
                }
            }
        }

        // The legacy file has no server URL, so only the username can be checked.
        let legacy = LegacyTokenFile::new(self.app.auth_token_file.clone(), self.app.allow_insecure_auth_file);
        let (username, token) = match legacy.read() {
            Ok(pair) => pair?,
            Err(e) => {
                warn!(error = %e, "Unable to read auth token file");
                return None;
            }
        };
        if username.is_empty() || token.is_empty() {
            return None;
        }
        if let Some(user) = configured {
            if user != username {
                warn!(
                    file_user = %username,
                    configured = %user,
                    "Ignoring auth token file for a different user"
                );
                return None;
            }
        }
        debug!("Using legacy auth token file; server identity cannot be verified");
        Some(ResolvedCredential::new(
            Credential::Session { username, token },
            CredentialSource::LegacyTokenFile,
        ))
    }

    fn password_from_config(&self) -> Option<ResolvedCredential> {
        let username = non_empty(&self.api.username)?;
        let password = non_empty(&self.api.password)?;
        Some(ResolvedCredential::new(
            Credential::UsernamePassword {
                username: username.to_string(),
                password: password.to_string(),
            },
            CredentialSource::ConfigFile,
        ))
    }

    fn password_from_auth_file(&self) -> Option<ResolvedCredential> {
        let file = AuthFile::new(self.app.auth_file.clone(), self.app.allow_insecure_auth_file);
        let (username, password) = match file.read() {
            Ok(pair) => pair?,
            Err(e) => {
                warn!(path = %file.path().display(), error = %e, "Unable to read auth file");
                return None;
            }
        };
        if username.is_empty() || password.is_empty() {
            debug!(path = %file.path().display(), "Auth file is incomplete");
            return None;
        }
        Some(ResolvedCredential::new(
            Credential::UsernamePassword { username, password },
            CredentialSource::AuthFile,
        ))
    }

    fn password_from_env(&self) -> Option<ResolvedCredential> {
        let username = self.env.get(ENV_USERNAME)?;
        let password = self.env.get(ENV_PASSWORD)?;
        Some(ResolvedCredential::new(
            Credential::UsernamePassword {
                username: username.to_string(),
                password: password.to_string(),
            },
            CredentialSource::Environment,
        ))
    }

    fn password_from_prompt(&mut self) -> Result<ResolvedCredential, CredentialError> {
        let default = self.configured_username().map(str::to_string);
        let Some(prompter) = self.prompter.as_mut() else {
            return Err(CredentialError::NoCredentialFound {
                url: self.identity.to_string(),
            });
        };

        let username = prompter
            .prompt_username(default.as_deref())
            .map_err(|source| CredentialError::Prompt {
                field: "username",
                source,
            })?;
        let username = match username.trim() {
            "" => default.ok_or(CredentialError::EmptyInput("Username"))?,
            name => name.to_string(),
        };

        let password = prompter
            .prompt_password()
            .map_err(|source| CredentialError::Prompt {
                field: "password",
                source,
            })?;
        if password.is_empty() {
            return Err(CredentialError::EmptyInput("Password"));
        }

        Ok(ResolvedCredential::new(
            Credential::UsernamePassword { username, password },
            CredentialSource::Prompt,
        ))
    }
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s).filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::auth::Session;
    use crate::config::Config;

    const URL: &str = "https://zabbix.example.com";

    /// Prompter that answers from fixed values and counts how often it was asked.
    struct FakePrompter {
        username: String,
        password: String,
        calls: Arc<AtomicUsize>,
    }

    impl FakePrompter {
        fn boxed(username: &str, password: &str) -> (Box<dyn Prompter>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let prompter = Box::new(Self {
                username: username.to_string(),
                password: password.to_string(),
                calls: calls.clone(),
            });
            (prompter, calls)
        }
    }

    impl Prompter for FakePrompter {
        fn prompt_username(&mut self, _default: Option<&str>) -> io::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.username.clone())
        }

        fn prompt_password(&mut self) -> io::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.password.clone())
        }
    }

    /// Config whose file-backed sources all live under `dir`.
    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.api.url = URL.to_string();
        config.app.session_file = dir.join("sessions.json");
        config.app.auth_file = dir.join("auth");
        config.app.auth_token_file = dir.join("auth_token");
        config.app.allow_insecure_auth_file = true;
        config
    }

    fn identity() -> ServerIdentity {
        ServerIdentity::parse(URL).unwrap()
    }

    fn resolver(config: Config, env: Environment, interactive: bool, prompter: Option<Box<dyn Prompter>>) -> CredentialResolver {
        let ctx = Context::new(config, env, interactive);
        CredentialResolver::new(&ctx, identity(), prompter)
    }

    fn user_pass(username: &str, password: &str) -> Credential {
        Credential::UsernamePassword {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_config_token_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.api.auth_token = "config-token".to_string();
        config.api.username = "admin".to_string();
        config.api.password = "pw".to_string();
        let env = Environment::from_pairs([(ENV_API_TOKEN, "env-token")]);

        let resolved = resolver(config, env, false, None).resolve(None).unwrap();
        assert_eq!(resolved.credential, Credential::ApiToken("config-token".to_string()));
        assert_eq!(resolved.source, CredentialSource::ConfigFile);
    }

    #[test]
    fn test_env_token_before_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut store = SessionStore::load(&config.app.session_file, true);
        store.put(Session::new(identity(), "admin", "session-token")).unwrap();
        let env = Environment::from_pairs([(ENV_API_TOKEN, "env-token")]);

        let resolved = resolver(config, env, false, None).resolve(Some(&store)).unwrap();
        assert_eq!(resolved.credential, Credential::ApiToken("env-token".to_string()));
        assert_eq!(resolved.source, CredentialSource::Environment);
    }

    #[test]
    fn test_session_store_before_passwords() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.api.username = "admin".to_string();
        config.api.password = "pw".to_string();
        let mut store = SessionStore::load(&config.app.session_file, true);
        store.put(Session::new(identity(), "admin", "session-token")).unwrap();

        let resolved = resolver(config, Environment::default(), false, None)
            .resolve(Some(&store))
            .unwrap();
        assert_eq!(
            resolved.credential,
            Credential::Session {
                username: "admin".to_string(),
                token: "session-token".to_string()
            }
        );
        assert_eq!(resolved.source, CredentialSource::SessionStore);
    }

    #[test]
    fn test_session_for_other_server_or_user_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.api.username = "admin".to_string();
        config.api.password = "pw".to_string();
        let mut store = SessionStore::load(&config.app.session_file, true);
        let other = ServerIdentity::parse("https://other.example.com").unwrap();
        store.put(Session::new(other, "admin", "other-server")).unwrap();

        let resolved = resolver(config.clone(), Environment::default(), false, None)
            .resolve(Some(&store))
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::ConfigFile);

        store.put(Session::new(identity(), "someone-else", "other-user")).unwrap();
        let resolved = resolver(config, Environment::default(), false, None)
            .resolve(Some(&store))
            .unwrap();
        assert_eq!(resolved.credential, user_pass("admin", "pw"));
    }

    #[test]
    fn test_session_skipped_when_disabled_or_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.api.username = "admin".to_string();
        config.api.password = "pw".to_string();
        let mut store = SessionStore::load(&config.app.session_file, true);
        store.put(Session::new(identity(), "admin", "session-token")).unwrap();

        let options = ResolveOptions {
            use_persisted_session: false,
            allow_prompt: false,
        };
        let resolved = resolver(config.clone(), Environment::default(), false, None)
            .resolve_with(Some(&store), options)
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::ConfigFile);

        config.app.use_session_file = false;
        let resolved = resolver(config, Environment::default(), false, None)
            .resolve(Some(&store))
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::ConfigFile);
    }

    #[test]
    fn test_legacy_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        std::fs::write(&config.app.auth_token_file, "admin::legacy-token").unwrap();

        let resolved = resolver(config.clone(), Environment::default(), false, None)
            .resolve(None)
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::LegacyTokenFile);

        // Username mismatch falls through to the next source
        config.api.username = "someone-else".to_string();
        config.api.password = "pw".to_string();
        let resolved = resolver(config, Environment::default(), false, None)
            .resolve(None)
            .unwrap();
        assert_eq!(resolved.credential, user_pass("someone-else", "pw"));
    }

    #[test]
    fn test_username_without_password_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.api.username = "admin".to_string();
        std::fs::write(&config.app.auth_file, "fileuser::filepass").unwrap();

        let resolved = resolver(config, Environment::default(), false, None)
            .resolve(None)
            .unwrap();
        assert_eq!(resolved.credential, user_pass("fileuser", "filepass"));
        assert_eq!(resolved.source, CredentialSource::AuthFile);
    }

    #[test]
    fn test_config_password_skips_auth_file_io() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.api.username = "admin".to_string();
        config.api.password = "pw".to_string();
        config.app.allow_insecure_auth_file = false;
        std::fs::write(&config.app.auth_file, "fileuser::filepass").unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let loose = std::fs::Permissions::from_mode(0o644);
            std::fs::set_permissions(&config.app.auth_file, loose).unwrap();
        }

        let auth_file = config.app.auth_file.clone();
        let resolved = resolver(config, Environment::default(), false, None)
            .resolve(None)
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::ConfigFile);

        // The auth file was never touched, so its permissions were not normalized
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&auth_file).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o644);
        }
    }

    #[test]
    fn test_incomplete_auth_file_falls_through_to_env() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.app.auth_file, "fileuser::").unwrap();
        let env = Environment::from_pairs([(ENV_USERNAME, "envuser"), (ENV_PASSWORD, "envpass")]);

        let resolved = resolver(config, env, false, None).resolve(None).unwrap();
        assert_eq!(resolved.credential, user_pass("envuser", "envpass"));
        assert_eq!(resolved.source, CredentialSource::Environment);
    }

    #[test]
    fn test_prompt_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let env = Environment::from_pairs([(ENV_USERNAME, "envuser"), (ENV_PASSWORD, "envpass")]);
        let (prompter, calls) = FakePrompter::boxed("prompted", "pw");

        let resolved = resolver(config.clone(), env, true, Some(prompter))
            .resolve(None)
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::Environment);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let (prompter, calls) = FakePrompter::boxed("prompted", "pw");
        let resolved = resolver(config, Environment::default(), true, Some(prompter))
            .resolve(None)
            .unwrap();
        assert_eq!(resolved.credential, user_pass("prompted", "pw"));
        assert_eq!(resolved.source, CredentialSource::Prompt);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_prompt_uses_configured_username_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.api.username = "admin".to_string();
        let (prompter, _) = FakePrompter::boxed("", "pw");

        let resolved = resolver(config, Environment::default(), true, Some(prompter))
            .resolve(None)
            .unwrap();
        assert_eq!(resolved.credential, user_pass("admin", "pw"));
    }

    #[test]
    fn test_empty_prompt_password_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let (prompter, _) = FakePrompter::boxed("user", "");

        let err = resolver(config, Environment::default(), true, Some(prompter))
            .resolve(None)
            .unwrap_err();
        assert!(matches!(err, CredentialError::EmptyInput("Password")));
    }

    #[test]
    fn test_non_interactive_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let (prompter, calls) = FakePrompter::boxed("user", "pw");

        let err = resolver(config, Environment::default(), false, Some(prompter))
            .resolve(None)
            .unwrap_err();
        assert!(matches!(err, CredentialError::NoCredentialFound { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_display_never_shows_secrets() {
        let resolved = ResolvedCredential::new(user_pass("admin", "hunter2"), CredentialSource::AuthFile);
        assert_eq!(resolved.to_string(), "username and password from auth file");
        assert!(!format!("{:?}", resolved).contains("hunter2"));
    }
}
