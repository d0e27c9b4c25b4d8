//! Client configuration.
//!
//! Values come from three layers, later layers winning:
//! 1. Built-in defaults (public cloud, 10 attempts, 1s-30s backoff).
//! 2. An optional TOML file.
//! 3. Environment variables: `GRAPH_TENANT_ID`, `GRAPH_CLIENT_ID`,
//!    `GRAPH_CLIENT_SECRET`, `GRAPH_ENDPOINT`.
//!
//! The CLI then overrides individual fields with its own flags.
//!
//! ```toml
//! tenant_id = "00000000-0000-0000-0000-000000000000"
//! client_id = "11111111-1111-1111-1111-111111111111"
//! endpoint = "https://graph.microsoft.com/"
//!
//! [retry]
//! max_attempts = 6
//! base_delay_ms = 500
//! ```
//!
//! Keeping the client secret out of the file and in `GRAPH_CLIENT_SECRET`
//! is recommended.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::auth::{DEFAULT_TOKEN_URL, GRAPH_DEFAULT_SCOPE, TokenProvider};
use crate::client::GRAPH_ENDPOINT;
use crate::error::{GraphError, Result};
use crate::retry::RetryConfig;

/// Retry limits as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        RetrySettings {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
        }
    }
}

/// Everything needed to build a [`GraphClient`](crate::client::GraphClient).
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Graph base URL, e.g. `https://graph.microsoft.us/` for GCC High.
    pub endpoint: String,
    /// Token endpoint template containing `{tenant_id}`.
    pub token_url: String,
    pub scope: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: None,
            endpoint: GRAPH_ENDPOINT.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            scope: GRAPH_DEFAULT_SCOPE.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
            retry: RetrySettings::default(),
        }
    }
}

// Hand-written so the secret never reaches logs.
impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl GraphConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GraphError::Config {
            message: "invalid configuration TOML".to_string(),
            source: Some(Box::new(e)),
        })
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GraphError::Config {
            message: format!("cannot read {}", path.display()),
            source: Some(Box::new(e)),
        })?;
        Self::from_toml_str(&content)
    }

    /// Applies `GRAPH_*` environment overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Applies `GRAPH_*` overrides from an arbitrary lookup. Empty values
    /// are ignored.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = var("GRAPH_TENANT_ID") {
            self.tenant_id = v;
        }
        if let Some(v) = var("GRAPH_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = var("GRAPH_CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = var("GRAPH_ENDPOINT") {
            self.endpoint = v;
        }
        self
    }

    /// Checks that credentials are present.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("tenant_id", self.tenant_id.is_empty()),
            ("client_id", self.client_id.is_empty()),
            (
                "client_secret",
                self.client_secret.as_deref().is_none_or(str::is_empty),
            ),
        ]
        .into_iter()
        .filter_map(|(name, is_missing)| is_missing.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Config {
                message: format!("missing {}", missing.join(", ")),
                source: None,
            })
        }
    }

    /// Builds a token provider after validating credentials.
    pub fn token_provider(&self) -> Result<TokenProvider> {
        self.validate()?;
        let secret = self.client_secret.as_deref().unwrap_or_default();
        Ok(
            TokenProvider::new(&self.tenant_id, &self.client_id, secret, &self.scope)
                .with_token_url(&self.token_url),
        )
    }

    /// Retry limits as a [`RetryConfig`]. `max_attempts` is at least 1.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(
            self.retry.max_attempts.max(1),
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }
}
