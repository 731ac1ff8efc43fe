//! API client for the Zabbix JSON-RPC endpoint.
//!
//! `ApiClient` owns the login state for one server: the resolved credential,
//! the live token, the detected API version and the session store. Calls
//! log in lazily and recover from an expired session at most once per call.

use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::expiry::{classify, ErrorKind, ExpirySignature};
use super::version::{ApiVersion, AuthTransport};
use super::ApiError;
use crate::auth::{
    AuthFile, Credential, CredentialResolver, CredentialSource, LegacyTokenFile, Prompter,
    ResolveOptions, ResolvedCredential, ServerIdentity, Session, SessionStore,
};
use crate::context::Context;

const JSONRPC_VERSION: &str = "2.0";

/// Content type the Zabbix frontend expects for API requests.
const CONTENT_TYPE: &str = "application/json-rpc";

/// Methods the server rejects when a token is attached.
const UNAUTHENTICATED_METHODS: [&str; 2] = ["apiinfo.version", "user.login"];

/// `data` used when the server omits it from an error object.
const MISSING_ERROR_DATA: &str = "No data";

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl From<RpcErrorBody> for ApiError {
    fn from(body: RpcErrorBody) -> Self {
        let data = match body.data {
            None | Some(Value::Null) => MISSING_ERROR_DATA.to_string(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };
        ApiError::Rpc {
            code: body.code,
            message: body.message,
            data,
        }
    }
}

/// JSON-RPC client bound to one server.
pub struct ApiClient {
    client: Client,
    identity: ServerIdentity,
    endpoint: String,
    request_id: u64,
    version: Option<ApiVersion>,
    token: Option<String>,
    login: Option<ResolvedCredential>,
    resolver: CredentialResolver,
    store: Option<SessionStore>,
    legacy_token_file: LegacyTokenFile,
    /// Set when prompted credentials should be saved after login.
    auth_file: Option<AuthFile>,
    expiry: ExpirySignature,
}

impl ApiClient {
    /// Build a client for the server named by `ctx`.
    ///
    /// No network traffic happens here; the first call logs in.
    pub fn from_context(ctx: &Context, prompter: Option<Box<dyn Prompter>>) -> Result<Self, ApiError> {
        let identity = ctx.server_identity()?;
        let api = &ctx.config.api;
        let app = &ctx.config.app;

        if !api.verify_ssl {
            warn!(server = %identity, "TLS certificate verification is disabled");
        }
        let client = Client::builder()
            .timeout(api.timeout())
            .danger_accept_invalid_certs(!api.verify_ssl)
            .build()?;

        let store = app
            .use_session_file
            .then(|| SessionStore::open(&app.session_file, app.allow_insecure_auth_file));
        let auth_file = app
            .save_auth_file
            .then(|| AuthFile::new(app.auth_file.clone(), app.allow_insecure_auth_file));

        Ok(Self {
            client,
            endpoint: identity.endpoint(),
            resolver: CredentialResolver::new(ctx, identity.clone(), prompter),
            identity,
            request_id: 0,
            version: None,
            token: None,
            login: None,
            store,
            legacy_token_file: LegacyTokenFile::new(
                app.auth_token_file.clone(),
                app.allow_insecure_auth_file,
            ),
            auth_file,
            expiry: app.session_expiry.clone(),
        })
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Credential the current token was obtained with.
    pub fn credential(&self) -> Option<&ResolvedCredential> {
        self.login.as_ref()
    }

    pub fn store(&self) -> Option<&SessionStore> {
        self.store.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    /// Server API version, queried once and cached.
    pub async fn api_version(&mut self) -> Result<ApiVersion, ApiError> {
        if let Some(version) = self.version {
            return Ok(version);
        }
        let result = self.request("apiinfo.version", &json!([]), None).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ApiError::InvalidResponse(format!("API version is not a string: {result}")))?;
        let version: ApiVersion = raw
            .parse()
            .map_err(|e| ApiError::InvalidResponse(format!("{e}")))?;
        info!(server = %self.identity, version = %version, "Detected API version");
        self.version = Some(version);
        Ok(version)
    }

    /// Resolve credentials and obtain a token, unless already logged in.
    pub async fn login(&mut self) -> Result<(), ApiError> {
        if self.token.is_some() {
            return Ok(());
        }
        let resolved = self.resolver.resolve(self.store.as_ref())?;
        self.authenticate(resolved).await
    }

    /// Call `method` with `params` and return its `result`.
    ///
    /// If the server reports an expired session, the session is dropped,
    /// credentials are resolved again and the call is retried exactly once.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, ApiError> {
        if UNAUTHENTICATED_METHODS.contains(&method) {
            return self.request(method, &params, None).await;
        }

        self.login().await?;
        let err = match self.authenticated_request(method, &params).await {
            Err(err) if classify(&err, &self.expiry) == ErrorKind::SessionExpired => err,
            other => return other,
        };

        warn!(server = %self.identity, method, error = %err, "Session expired, re-authenticating");
        self.reauthenticate().await?;

        match self.authenticated_request(method, &params).await {
            Err(err) if classify(&err, &self.expiry) == ErrorKind::SessionExpired => {
                warn!(server = %self.identity, method, "Session rejected again after re-authenticating");
                self.token = None;
                self.forget_session();
                Err(ApiError::SessionExpired {
                    identity: self.identity.to_string(),
                })
            }
            other => other,
        }
    }

    /// End the server-side session and forget it locally.
    ///
    /// API tokens are long-lived and never logged out.
    pub async fn logout(&mut self) -> Result<(), ApiError> {
        let Some(login) = self.login.as_ref() else {
            return Ok(());
        };
        if matches!(login.credential, Credential::ApiToken(_)) {
            debug!("API token in use, nothing to log out");
            return Ok(());
        }

        let result = self.authenticated_request("user.logout", &json!([])).await;
        self.forget_session();
        self.token = None;
        self.login = None;

        match result {
            Ok(_) => {
                info!(server = %self.identity, "Logged out");
                Ok(())
            }
            Err(err) if classify(&err, &self.expiry) == ErrorKind::SessionExpired => {
                debug!("Session was already gone on logout");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Turn a resolved credential into a live token.
    async fn authenticate(&mut self, resolved: ResolvedCredential) -> Result<(), ApiError> {
        let token = match &resolved.credential {
            Credential::ApiToken(token) | Credential::Session { token, .. } => token.clone(),
            Credential::UsernamePassword { username, password } => {
                let version = self.api_version().await?;
                let mut params = serde_json::Map::new();
                params.insert(version.login_user_param().to_string(), json!(username));
                params.insert("password".to_string(), json!(password));

                let result = self
                    .request("user.login", &Value::Object(params), None)
                    .await?;
                let token = result
                    .as_str()
                    .ok_or_else(|| ApiError::InvalidResponse("user.login did not return a token".to_string()))?
                    .to_string();

                self.remember_session(username, &token);
                if resolved.source == CredentialSource::Prompt {
                    if let Some(file) = &self.auth_file {
                        if let Err(e) = file.write(username, password) {
                            warn!(path = %file.path().display(), error = %e, "Unable to save auth file");
                        }
                    }
                }
                token
            }
        };

        info!(server = %self.identity, credential = %resolved, "Logged in");
        self.token = Some(token);
        self.login = Some(resolved);
        Ok(())
    }

    /// Drop the dead session and log in again.
    ///
    /// A persisted session token cannot be renewed by itself, so it is
    /// replaced by whatever the remaining sources yield. Passwords and API
    /// tokens are reused.
    async fn reauthenticate(&mut self) -> Result<(), ApiError> {
        self.token = None;
        self.forget_session();

        let resolved = match self.login.take() {
            Some(previous) if !matches!(previous.credential, Credential::Session { .. }) => previous,
            _ => self.resolver.resolve_with(
                self.store.as_ref(),
                ResolveOptions {
                    use_persisted_session: false,
                    allow_prompt: true,
                },
            )?,
        };
        self.authenticate(resolved).await
    }

    fn remember_session(&mut self, username: &str, token: &str) {
        if let Some(store) = self.store.as_mut() {
            let session = Session::new(self.identity.clone(), username, token);
            if let Err(e) = store.put(session) {
                warn!(error = %e, "Unable to save session");
            }
        }
    }

    fn forget_session(&mut self) {
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.invalidate(&self.identity) {
                warn!(error = %e, "Unable to remove session from session file");
            }
        }
        let from_legacy = self
            .login
            .as_ref()
            .is_some_and(|l| l.source == CredentialSource::LegacyTokenFile);
        if from_legacy {
            if let Err(e) = self.legacy_token_file.clear() {
                warn!(error = %e, "Unable to clear auth token file");
            }
        }
    }

    async fn authenticated_request(&mut self, method: &str, params: &Value) -> Result<Value, ApiError> {
        let transport = self.api_version().await?.auth_transport();
        let token = self
            .token
            .clone()
            .ok_or_else(|| ApiError::InvalidResponse("Not logged in".to_string()))?;
        self.request(method, params, Some((transport, token.as_str()))).await
    }

    async fn request(
        &mut self,
        method: &str,
        params: &Value,
        auth: Option<(AuthTransport, &str)>,
    ) -> Result<Value, ApiError> {
        self.request_id += 1;
        let mut body = json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params,
            "id": self.request_id,
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, CONTENT_TYPE);
        match auth {
            Some((AuthTransport::Body, token)) => body["auth"] = json!(token),
            Some((AuthTransport::Header, token)) => request = request.bearer_auth(token),
            None => {}
        }

        debug!(method, id = self.request_id, "Sending API request");
        let response = request.json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(ApiError::InvalidResponse(format!("Empty response to {method}")));
        }
        let parsed: RpcResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Unable to parse response to {method}: {e}")))?;

        if let Some(error) = parsed.error {
            let err = ApiError::from(error);
            debug!(method, error = %err, "API returned an error");
            return Err(err);
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}
