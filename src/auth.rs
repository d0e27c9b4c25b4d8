//! OAuth2 client-credentials authentication for the Microsoft identity platform.
//!
//! Acquires bearer tokens from `/{tenant}/oauth2/v2.0/token` using the
//! client_credentials grant. The token is cached in `TokenProvider` and
//! refreshed on demand. `GraphClient` reads the cached token via `token()`
//! and calls `refresh_token()` when it is absent or stale.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{GraphError, Result};

/// Public-cloud token endpoint. `{tenant_id}` is replaced at runtime.
pub const DEFAULT_TOKEN_URL: &str =
    "https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token";

/// Scope granting the application's configured Graph permissions.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Form body sent to the token endpoint.
#[derive(Serialize)]
pub struct TokenRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
}

/// Subset of the token response that we need. Extra fields such as
/// `ext_expires_in` are ignored.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Safety buffer subtracted from `expires_in` so requests never race the
/// expiry boundary.
const EXPIRY_BUFFER_SECS: u64 = 60;

/// Manages OAuth2 token acquisition and caching.
///
/// Invariants:
/// - `response` is `None` until the first successful `refresh_token()`
///   call, or after `invalidate()`.
/// - `acquired_at` is `Some` whenever `response` is `Some`.
pub struct TokenProvider {
    client: reqwest::Client,
    token_url: String,
    scope: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    response: Option<TokenResponse>,
    acquired_at: Option<Instant>,
}

impl TokenProvider {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: &str, scope: &str) -> Self {
        TokenProvider {
            client: reqwest::Client::new(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            scope: scope.to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            response: None,
            acquired_at: None,
        }
    }

    /// Overrides the token endpoint template (national clouds, tests).
    /// The template may contain `{tenant_id}`.
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    /// Creates a provider holding a pre-set token, bypassing the identity
    /// platform. The token is treated as freshly acquired (3600s).
    pub fn with_token(token: &str) -> Self {
        TokenProvider {
            client: reqwest::Client::new(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            scope: String::new(),
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            response: Some(TokenResponse {
                access_token: token.to_string(),
                token_type: "Bearer".to_string(),
                expires_in: 3600,
            }),
            acquired_at: Some(Instant::now()),
        }
    }

    fn endpoint(&self) -> String {
        self.token_url.replace("{tenant_id}", &self.tenant_id)
    }

    /// Fetches a new token and caches it.
    ///
    /// The body is read as text before the status is checked so a failure
    /// keeps the AADSTS code and description.
    pub async fn refresh_token(&mut self) -> Result<()> {
        let body = TokenRequest {
            client_id: &self.client_id,
            scope: &self.scope,
            client_secret: &self.client_secret,
            grant_type: "client_credentials",
        };

        let url = self.endpoint();
        tracing::debug!(tenant_id = %self.tenant_id, "requesting access token");

        let response = self
            .client
            .post(&url)
            .form(&body)
            .send()
            .await
            .map_err(|e| GraphError::Auth {
                message: "token endpoint unreachable".to_string(),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| GraphError::Auth {
            message: format!("failed to read token response ({status})"),
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            return Err(GraphError::Auth {
                message: format!("token request failed ({status}): {body}"),
                source: None,
            });
        }

        let resp: TokenResponse = serde_json::from_str(&body).map_err(|e| GraphError::Auth {
            message: "failed to parse token response".to_string(),
            source: Some(Box::new(e)),
        })?;
        self.acquired_at = Some(Instant::now());
        self.response = Some(resp);

        Ok(())
    }

    /// Drops the cached token so the next `token()` call returns `None`.
    pub fn invalidate(&mut self) {
        self.response = None;
        self.acquired_at = None;
    }

    /// Returns `true` if a token exists but has exceeded its lifetime
    /// minus the safety buffer.
    fn is_expired(&self) -> bool {
        match (&self.response, self.acquired_at) {
            (Some(resp), Some(acquired)) => {
                let lifetime = resp.expires_in.saturating_sub(EXPIRY_BUFFER_SECS);
                acquired.elapsed().as_secs() >= lifetime
            }
            _ => false,
        }
    }

    /// Returns the cached access token, or `None` if there is none or it
    /// has expired.
    pub fn token(&self) -> Option<&str> {
        if self.is_expired() {
            return None;
        }
        self.response.as_ref().map(|ret| ret.access_token.as_str())
    }
}
