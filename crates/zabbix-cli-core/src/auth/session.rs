//! Persisted API sessions, keyed by server identity.
//!
//! The session file is a JSON object mapping a normalized server URL to
//! `{username, token, created_at}`. It is the single source of truth across
//! process invocations: read fully, mutated in memory, and rewritten fully
//! through a temp file + rename on every change, so a concurrent reader
//! never sees a half-written file. Two processes re-authenticating at the
//! same time may overwrite each other's entry; either token is valid.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::files::{create_private, has_secure_permissions};

/// JSON-RPC endpoint path appended to the server identity.
const API_PATH: &str = "api_jsonrpc.php";

/// Normalized base URL of a server.
///
/// Scheme and host are lower-cased, default ports dropped, and any trailing
/// `/` or `/api_jsonrpc.php` removed, so `https://Zabbix.example.com/` and
/// `https://zabbix.example.com/api_jsonrpc.php` are the same server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerIdentity(String);

impl ServerIdentity {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        let mut url = Url::parse(raw.trim())?;
        url.set_query(None);
        url.set_fragment(None);

        let path = url.path().trim_end_matches('/');
        let path = path.strip_suffix(API_PATH).unwrap_or(path);
        let path = path.trim_end_matches('/').to_string();
        url.set_path(&path);

        Ok(Self(url.as_str().trim_end_matches('/').to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full JSON-RPC endpoint URL for this server.
    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.0, API_PATH)
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: ServerIdentity,
    pub username: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: ServerIdentity, username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            identity,
            username: username.into(),
            token: token.into(),
            created_at: Utc::now(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// On-disk form of a session; the identity is the map key.
#[derive(Debug, Serialize, Deserialize)]
struct SessionEntry {
    username: String,
    token: String,
    created_at: DateTime<Utc>,
}

type SessionFile = BTreeMap<ServerIdentity, SessionEntry>;

#[derive(Error, Debug)]
pub enum SessionStoreError {
    #[error("Unable to write session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to serialize session file: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct SessionStore {
    path: PathBuf,
    allow_insecure: bool,
    /// Filled on first read, so a store nobody consults never touches disk.
    sessions: OnceLock<BTreeMap<ServerIdentity, Session>>,
}

impl SessionStore {
    /// Load the store from `path`.
    ///
    /// Never fails: a missing, empty, corrupt or (unless `allow_insecure`)
    /// loosely-permissioned file is logged and treated as empty.
    pub fn load(path: impl Into<PathBuf>, allow_insecure: bool) -> Self {
        let store = Self::open(path, allow_insecure);
        store.loaded();
        store
    }

    /// Bind the store to `path` without reading it. The file is read on
    /// the first lookup, `put` or `invalidate`.
    pub fn open(path: impl Into<PathBuf>, allow_insecure: bool) -> Self {
        Self {
            path: path.into(),
            allow_insecure,
            sessions: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file has been read yet.
    pub fn is_loaded(&self) -> bool {
        self.sessions.get().is_some()
    }

    pub fn get(&self, identity: &ServerIdentity) -> Option<&Session> {
        self.loaded().get(identity)
    }

    /// All sessions, ordered by identity.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.loaded().values()
    }

    pub fn len(&self) -> usize {
        self.loaded().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded().is_empty()
    }

    /// Store `session` under its identity, replacing any previous one, and
    /// write through to disk.
    ///
    /// The file is re-read first so entries other processes wrote since we
    /// loaded survive.
    pub fn put(&mut self, session: Session) -> Result<(), SessionStoreError> {
        let mut sessions = read_sessions(&self.path, self.allow_insecure);
        info!(server = %session.identity, username = %session.username, "Saving session");
        sessions.insert(session.identity.clone(), session);
        self.save(&sessions)?;
        self.sessions = OnceLock::from(sessions);
        Ok(())
    }

    /// Remove the session for `identity` and write through to disk.
    ///
    /// Returns whether an entry was removed.
    pub fn invalidate(&mut self, identity: &ServerIdentity) -> Result<bool, SessionStoreError> {
        let mut sessions = read_sessions(&self.path, self.allow_insecure);
        let removed = sessions.remove(identity).is_some();
        if removed {
            info!(server = %identity, "Invalidated session");
            self.save(&sessions)?;
        }
        self.sessions = OnceLock::from(sessions);
        Ok(removed)
    }

    fn loaded(&self) -> &BTreeMap<ServerIdentity, Session> {
        self.sessions.get_or_init(|| {
            let sessions = read_sessions(&self.path, self.allow_insecure);
            debug!(path = %self.path.display(), count = sessions.len(), "Loaded session store");
            sessions
        })
    }

    fn save(&self, sessions: &BTreeMap<ServerIdentity, Session>) -> Result<(), SessionStoreError> {
        let file: SessionFile = sessions
            .iter()
            .map(|(identity, s)| {
                (
                    identity.clone(),
                    SessionEntry {
                        username: s.username.clone(),
                        token: s.token.clone(),
                        created_at: s.created_at,
                    },
                )
            })
            .collect();
        let contents = serde_json::to_string_pretty(&file)?;
        self.write_atomic(contents.as_bytes())
            .map_err(|source| SessionStoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), count = file.len(), "Saved session store");
        Ok(())
    }

    /// Write to a sibling temp file, then rename it over the target.
    fn write_atomic(&self, contents: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.temp_path();
        // A leftover from a crashed writer may carry looser permissions
        let _ = fs::remove_file(&tmp);
        let result = (|| {
            let mut file = create_private(&tmp, !self.allow_insecure)?;
            file.write_all(contents)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    /// Temp file name unique per process so concurrent writers never share it.
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sessions".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
    }
}

fn read_sessions(path: &Path, allow_insecure: bool) -> BTreeMap<ServerIdentity, Session> {
    if !path.exists() {
        debug!(path = %path.display(), "No session file");
        return BTreeMap::new();
    }

    if !allow_insecure {
        match has_secure_permissions(path) {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    path = %path.display(),
                    "Session file must have 600 permissions. Ignoring it"
                );
                return BTreeMap::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unable to check session file permissions");
                return BTreeMap::new();
            }
        }
    }

    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unable to read session file");
            return BTreeMap::new();
        }
    };
    if contents.trim().is_empty() {
        debug!(path = %path.display(), "Session file is empty");
        return BTreeMap::new();
    }

    match serde_json::from_str::<SessionFile>(&contents) {
        Ok(file) => file
            .into_iter()
            .map(|(identity, e)| {
                let session = Session {
                    identity: identity.clone(),
                    username: e.username,
                    token: e.token,
                    created_at: e.created_at,
                };
                (identity, session)
            })
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt session file, starting empty");
            BTreeMap::new()
        }
    }
}
