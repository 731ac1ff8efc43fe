use std::fmt;
use std::str::FromStr;

/// First version that takes the token in the `Authorization` header.
pub const HEADER_AUTH_SINCE: ApiVersion = ApiVersion::new(6, 4, 0);

/// First version whose `user.login` takes `username` instead of `user`.
pub const USERNAME_PARAM_SINCE: ApiVersion = ApiVersion::new(5, 4, 0);

/// Server API version as reported by `apiinfo.version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// How a session token is attached to requests for this version.
    pub fn auth_transport(&self) -> AuthTransport {
        if *self >= HEADER_AUTH_SINCE {
            AuthTransport::Header
        } else {
            AuthTransport::Body
        }
    }

    /// Name of the user field in `user.login` params.
    pub fn login_user_param(&self) -> &'static str {
        if *self >= USERNAME_PARAM_SINCE {
            "username"
        } else {
            "user"
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError(String);

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid API version {:?}", self.0)
    }
}

impl std::error::Error for ParseVersionError {}

impl FromStr for ApiVersion {
    type Err = ParseVersionError;

    /// Lenient: `7.0.0alpha1` is 7.0.0, `6.0` is 6.0.0. Only the major
    /// component is required.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.').map(leading_number);
        let major = parts
            .next()
            .flatten()
            .ok_or_else(|| ParseVersionError(s.to_string()))?;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Ok(Self::new(major, minor, patch))
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let end = part
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(part.len());
    part[..end].parse().ok()
}

/// Where the session token goes on an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTransport {
    /// `auth` member of the JSON-RPC request object.
    Body,
    /// `Authorization: Bearer <token>` header.
    Header,
}
