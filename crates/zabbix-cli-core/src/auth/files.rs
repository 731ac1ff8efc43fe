//! Plaintext credential files and owner-only permission handling.
//!
//! Both files hold a single `USERNAME::SECRET` line:
//! - the auth file stores a username and password
//! - the legacy auth-token file stores a username and session token
//!   (written by releases that predate the session store)

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Separator between username and secret.
const SEPARATOR: &str = "::";

/// Owner read/write only.
#[cfg(unix)]
const SECURE_MODE: u32 = 0o600;

/// Parse `USERNAME::SECRET` from the first line of `contents`.
///
/// Either half may be empty; callers decide whether that is a usable pair.
pub fn parse_user_secret(contents: &str) -> Option<(String, String)> {
    let line = contents.lines().next()?.trim();
    let (username, secret) = line.split_once(SEPARATOR)?;
    Some((username.trim().to_string(), secret.to_string()))
}

/// Whether only the owner can read and write `path`. Always true off unix.
pub fn has_secure_permissions(path: &Path) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)?.permissions().mode() & 0o777;
        Ok(mode == SECURE_MODE)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(true)
    }
}

/// Restrict `path` to owner read/write. No-op off unix.
pub fn set_secure_permissions(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(SECURE_MODE))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Create or truncate `path` for writing. When `private` is set, a newly
/// created file is owner read/write from the start; an existing file keeps
/// its permissions.
pub fn create_private(path: &Path, private: bool) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(SECURE_MODE);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = private;
    }
    options.open(path)
}

/// The `USERNAME::PASSWORD` auth file.
#[derive(Debug, Clone)]
pub struct AuthFile {
    path: PathBuf,
    allow_insecure: bool,
}

impl AuthFile {
    pub fn new(path: PathBuf, allow_insecure: bool) -> Self {
        Self {
            path,
            allow_insecure,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the username/password pair.
    ///
    /// Returns `Ok(None)` if the file does not exist. When insecure
    /// permissions are not allowed, the file is tightened to owner-only
    /// before it is read.
    pub fn read(&self) -> io::Result<Option<(String, String)>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No auth file");
            return Ok(None);
        }
        if !self.allow_insecure && !has_secure_permissions(&self.path)? {
            info!(path = %self.path.display(), "Restricting auth file permissions to owner");
            set_secure_permissions(&self.path)?;
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(parse_user_secret(&contents))
    }

    /// Write the username/password pair, restricting permissions when the
    /// file is created.
    pub fn write(&self, username: &str, password: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = create_private(&self.path, !self.allow_insecure)?;
        file.write_all(format!("{username}{SEPARATOR}{password}").as_bytes())?;
        info!(path = %self.path.display(), "Wrote auth file");
        Ok(())
    }
}

/// The single-entry `USERNAME::TOKEN` file from older releases.
#[derive(Debug, Clone)]
pub struct LegacyTokenFile {
    path: PathBuf,
    allow_insecure: bool,
}

impl LegacyTokenFile {
    pub fn new(path: PathBuf, allow_insecure: bool) -> Self {
        Self {
            path,
            allow_insecure,
        }
    }

    /// Read the username/token pair. Files with loose permissions are
    /// refused unless insecure permissions are allowed.
    pub fn read(&self) -> io::Result<Option<(String, String)>> {
        if !self.path.exists() {
            return Ok(None);
        }
        if !self.allow_insecure && !has_secure_permissions(&self.path)? {
            warn!(
                path = %self.path.display(),
                "Auth token file must have 600 permissions. Refusing to load"
            );
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(parse_user_secret(&contents))
    }

    /// Empty the file so a dead token is not picked up again.
    pub fn clear(&self) -> io::Result<()> {
        if self.path.exists() {
            fs::write(&self.path, "")?;
            debug!(path = %self.path.display(), "Cleared auth token file");
        }
        Ok(())
    }
}
