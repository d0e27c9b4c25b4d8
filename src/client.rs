//! Authenticated HTTP client for Microsoft Graph.
//!
//! `GraphClient` wraps a `reqwest::Client` and a `TokenProvider` behind a
//! `Mutex` and exposes a small set of verb helpers. Every helper takes a
//! [`GraphRequest`] naming the API version, the path under it, OData query
//! options, the statuses the caller accepts, and a [`RequestPolicy`].
//!
//! Per request the client:
//! 1. Attaches a bearer token, acquiring one lazily.
//! 2. On the first bare `401`, invalidates the token, refreshes once, and
//!    resends. A request never refreshes twice.
//! 3. Accepts the response if its status is in the request's valid set
//!    (any 2xx when the set is empty).
//! 4. Otherwise parses the OData error and asks the policy's
//!    [`ConsistencyCheck`](crate::retry::ConsistencyCheck) whether to retry.
//!    Retries back off exponentially up to `RetryConfig::max_attempts`.
//! 5. Reports anything else as [`GraphError::Api`].
//!
//! Collection reads follow `@odata.nextLink` until the last page unless
//! the policy disables paging. A next link is refused if it was already
//! visited or points outside the client's base URL.
//!
//! A policy's cancellation token is raced against every send, body read,
//! and backoff sleep.

use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::auth::TokenProvider;
use crate::config::GraphConfig;
use crate::decode::{Discriminated, decode_collection};
use crate::error::{GraphError, Result};
use crate::odata::{ODataError, ODataList, Query};
use crate::retry::{ConsistencyCheck, RequestPolicy, ResponseMeta, RetryConfig};

/// Public-cloud Graph endpoint.
pub const GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/";

/// Connect timeout (TCP + TLS handshake).
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall per-attempt request timeout, including body download.
const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn build_api_client(connect_timeout: Duration, request_timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()?)
}

/// Graph API version segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    /// `v1.0`, the stable surface.
    V1,
    /// `beta`, needed by authentication methods and the settings catalog.
    Beta,
}

impl ApiVersion {
    /// The URL segment for this version.
    pub fn as_str(self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1.0",
            ApiVersion::Beta => "beta",
        }
    }
}

/// One Graph call: where it goes and how its response is judged.
#[derive(Debug, Clone)]
pub struct GraphRequest {
    /// API version segment.
    pub version: ApiVersion,
    /// Path below the version segment, e.g. `users/{id}/authentication/methods`.
    pub path: String,
    /// OData query options.
    pub query: Query,
    /// Statuses treated as success. Empty means any 2xx.
    pub valid_statuses: Vec<StatusCode>,
    /// Paging and consistency retry behavior.
    pub policy: RequestPolicy,
}

impl GraphRequest {
    /// A request with default policy and no query options.
    pub fn new(version: ApiVersion, path: impl Into<String>) -> Self {
        GraphRequest {
            version,
            path: path.into(),
            query: Query::default(),
            valid_statuses: Vec::new(),
            policy: RequestPolicy::default(),
        }
    }

    /// Shorthand for a `v1.0` request.
    pub fn v1(path: impl Into<String>) -> Self {
        Self::new(ApiVersion::V1, path)
    }

    /// Shorthand for a `beta` request.
    pub fn beta(path: impl Into<String>) -> Self {
        Self::new(ApiVersion::Beta, path)
    }

    /// Sets query options. A positive `$top` also disables paging.
    pub fn with_query(mut self, query: &Query) -> Self {
        self.policy.disable_paging |= query.bounds_results();
        self.query = query.clone();
        self
    }

    /// Adds a status to the valid set.
    pub fn expect(mut self, status: StatusCode) -> Self {
        self.valid_statuses.push(status);
        self
    }

    /// Replaces the consistency check.
    pub fn with_consistency(mut self, consistency: ConsistencyCheck) -> Self {
        self.policy.consistency = consistency;
        self
    }

    /// Replaces the whole policy, keeping paging disabled if the query
    /// already bounds the result.
    pub fn with_policy(mut self, policy: RequestPolicy) -> Self {
        let bounded = self.query.bounds_results();
        self.policy = policy;
        self.policy.disable_paging |= bounded;
        self
    }

    fn accepts(&self, status: StatusCode) -> bool {
        if self.valid_statuses.is_empty() {
            status.is_success()
        } else {
            self.valid_statuses.contains(&status)
        }
    }
}

/// Authenticated HTTP client for the Graph REST API.
///
/// `auth` sits behind a `Mutex` because refreshing needs `&mut`. The lock
/// is held only for the token check or refresh, never across a Graph
/// round-trip.
pub struct GraphClient {
    client: Client,
    base_url: String,
    auth: Mutex<TokenProvider>,
    retry: RetryConfig,
}

impl GraphClient {
    /// Creates a client for the public-cloud Graph endpoint.
    pub fn new(auth: TokenProvider) -> Result<Self> {
        Self::with_base_url(auth, GRAPH_ENDPOINT)
    }

    /// Points the client at another Graph endpoint: a national cloud or a
    /// local mock server.
    pub fn with_base_url(auth: TokenProvider, base_url: &str) -> Result<Self> {
        let client = build_api_client(API_CONNECT_TIMEOUT, API_REQUEST_TIMEOUT)?;
        Ok(Self::assemble(client, auth, base_url))
    }

    /// Builds a client, token provider included, from loaded configuration.
    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        let client = build_api_client(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::assemble(client, config.token_provider()?, &config.endpoint)
            .with_retry(config.retry()))
    }

    fn assemble(client: Client, auth: TokenProvider, base_url: &str) -> Self {
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        GraphClient {
            client,
            base_url,
            auth: Mutex::new(auth),
            retry: RetryConfig::default(),
        }
    }

    /// Replaces the retry limits.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The retry limits in effect.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    fn url(&self, request: &GraphRequest) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            request.version.as_str(),
            request.path.trim_start_matches('/')
        )
    }

    /// Returns a valid bearer token, refreshing if none is cached or the
    /// cached one has expired.
    async fn bearer_token(&self) -> Result<String> {
        let mut auth = self.auth.lock().await;
        if auth.token().is_none() {
            auth.refresh_token().await?;
        }

        auth.token().map(str::to_owned).ok_or_else(|| GraphError::Auth {
            message: "token missing after refresh".to_string(),
            source: None,
        })
    }

    /// Invalidates the current token and acquires a fresh one.
    async fn force_refresh(&self) -> Result<String> {
        let mut auth = self.auth.lock().await;
        auth.invalidate();
        auth.refresh_token().await?;
        tracing::debug!("access token refreshed after 401");

        auth.token().map(str::to_owned).ok_or_else(|| GraphError::Auth {
            message: "token missing after forced refresh".to_string(),
            source: None,
        })
    }

    /// Constructs an authenticated request builder.
    fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        token: &str,
        request: &GraphRequest,
        with_query: bool,
        body: Option<&B>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url).bearer_auth(token);
        if with_query {
            let pairs = request.query.pairs();
            if !pairs.is_empty() {
                req = req.query(&pairs);
            }
        }
        for (name, value) in request.query.headers() {
            req = req.header(name, value);
        }
        if let Some(payload) = body {
            req = req.json(payload);
        }
        req
    }

    /// Sends one attempt, refreshing the token once on a bare `401`, and
    /// reads the body.
    async fn send_once<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        url: &str,
        request: &GraphRequest,
        with_query: bool,
        body: Option<&B>,
        refreshed: &mut bool,
    ) -> Result<(ResponseMeta, String)> {
        let token = self.bearer_token().await?;
        let mut resp = self
            .build_request(method.clone(), url, &token, request, with_query, body)
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED && !*refreshed {
            *refreshed = true;
            let fresh_token = self.force_refresh().await?;
            resp = self
                .build_request(method.clone(), url, &fresh_token, request, with_query, body)
                .send()
                .await?;
        }

        let meta = ResponseMeta {
            status: resp.status(),
            request_id: resp
                .headers()
                .get("request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        };
        let text = resp.text().await?;
        Ok((meta, text))
    }

    /// Core send loop shared by every verb helper.
    ///
    /// `url` is absolute. `with_query` is false when following a next
    /// link, which already carries the query string.
    async fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        request: &GraphRequest,
        with_query: bool,
        body: Option<&B>,
    ) -> Result<(String, StatusCode)> {
        let policy = &request.policy;
        let mut refreshed = false;
        let mut attempt = 1;

        loop {
            if policy.is_cancelled() {
                return Err(GraphError::Cancelled);
            }

            let (meta, text) = until_cancelled(
                policy,
                self.send_once(&method, url, request, with_query, body, &mut refreshed),
            )
            .await?;

            if request.accepts(meta.status) {
                return Ok((text, meta.status));
            }

            let odata = ODataError::from_body(&text);
            if attempt < self.retry.max_attempts
                && policy.consistency.should_retry(&meta, odata.as_ref())
            {
                let delay = self.retry.backoff(attempt);
                tracing::warn!(
                    %method,
                    path = %request.path,
                    attempt,
                    status = meta.status.as_u16(),
                    code = odata.as_ref().and_then(ODataError::code).unwrap_or(""),
                    check = policy.consistency.name(),
                    delay_ms = delay.as_millis() as u64,
                    "consistency failure, retrying"
                );
                until_cancelled(policy, async {
                    tokio::time::sleep(delay).await;
                    Ok(())
                })
                .await?;
                attempt += 1;
                continue;
            }

            return Err(GraphError::Api {
                status: meta.status,
                body: text,
                odata,
            });
        }
    }

    /// Sends a request and deserializes the JSON response.
    pub async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        request: &GraphRequest,
        body: Option<&B>,
    ) -> Result<(T, StatusCode)> {
        let url = self.url(request);
        let (text, status) = self.dispatch(method, &url, request, true, body).await?;
        Ok((serde_json::from_str(&text)?, status))
    }

    /// Sends a request whose response body is ignored (typically 204).
    pub async fn send_empty<B: Serialize + ?Sized>(
        &self,
        method: Method,
        request: &GraphRequest,
        body: Option<&B>,
    ) -> Result<StatusCode> {
        let url = self.url(request);
        let (_, status) = self.dispatch(method, &url, request, true, body).await?;
        Ok(status)
    }

    /// GET a single JSON object.
    pub async fn get<T: DeserializeOwned>(&self, request: &GraphRequest) -> Result<(T, StatusCode)> {
        self.send_json::<T, ()>(Method::GET, request, None).await
    }

    /// GET a single JSON object without decoding it.
    pub async fn get_raw(&self, request: &GraphRequest) -> Result<(Value, StatusCode)> {
        self.get::<Value>(request).await
    }

    /// POST a JSON body and deserialize the created entity.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        request: &GraphRequest,
        body: &B,
    ) -> Result<(T, StatusCode)> {
        self.send_json(Method::POST, request, Some(body)).await
    }

    /// POST an action whose response has no body.
    pub async fn post_empty<B: Serialize + ?Sized>(
        &self,
        request: &GraphRequest,
        body: Option<&B>,
    ) -> Result<StatusCode> {
        self.send_empty(Method::POST, request, body).await
    }

    /// PATCH a JSON body. Graph answers updates with `204 No Content`.
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        request: &GraphRequest,
        body: &B,
    ) -> Result<StatusCode> {
        self.send_empty(Method::PATCH, request, Some(body)).await
    }

    /// DELETE a resource.
    pub async fn delete(&self, request: &GraphRequest) -> Result<StatusCode> {
        self.send_empty::<()>(Method::DELETE, request, None).await
    }

    /// GET a collection as raw elements, following next links unless the
    /// policy disables paging.
    pub async fn get_collection(&self, request: &GraphRequest) -> Result<(Vec<Value>, StatusCode)> {
        let url = self.url(request);
        let (text, mut status) = self
            .dispatch::<()>(Method::GET, &url, request, true, None)
            .await?;
        let mut page: ODataList<Value> = serde_json::from_str(&text)?;
        let mut items = std::mem::take(&mut page.value);

        if request.policy.disable_paging {
            return Ok((items, status));
        }

        let mut visited = HashSet::from([url]);
        let mut pages = 1;
        while let Some(next) = page.next_link.take() {
            self.check_next_link(&next, &visited)?;
            visited.insert(next.clone());
            pages += 1;
            tracing::debug!(path = %request.path, page = pages, "following @odata.nextLink");
            let (text, next_status) = self
                .dispatch::<()>(Method::GET, &next, request, false, None)
                .await?;
            page = serde_json::from_str(&text)?;
            items.append(&mut page.value);
            status = next_status;
        }

        Ok((items, status))
    }

    /// Refuses a next link that repeats a page or leaves the base URL.
    /// The second case keeps the bearer token off foreign hosts.
    fn check_next_link(&self, next: &str, visited: &HashSet<String>) -> Result<()> {
        let reason = if !next.starts_with(&self.base_url) {
            "next link leaves the configured endpoint"
        } else if visited.contains(next) {
            "next link repeats an earlier page"
        } else {
            return Ok(());
        };
        tracing::warn!(link = next, reason, "refusing @odata.nextLink");
        Err(GraphError::Paging {
            link: next.to_string(),
            reason,
        })
    }

    /// GET a collection of one concrete type.
    pub async fn list<T: DeserializeOwned>(&self, request: &GraphRequest) -> Result<(Vec<T>, StatusCode)> {
        let (items, status) = self.get_collection(request).await?;
        Ok((serde_json::from_value(Value::Array(items))?, status))
    }

    /// GET a polymorphic collection, decoding each element by `@odata.type`.
    ///
    /// Elements with a missing or unknown discriminator are dropped.
    pub async fn list_discriminated<T: Discriminated>(
        &self,
        request: &GraphRequest,
    ) -> Result<(Vec<T>, StatusCode)> {
        let (items, status) = self.get_collection(request).await?;
        Ok((decode_collection(T::registry(), &items)?, status))
    }
}

/// Races `fut` against the policy's cancellation token, if it has one.
async fn until_cancelled<T>(policy: &RequestPolicy, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match &policy.cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(GraphError::Cancelled),
            result = fut => result,
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GraphClient {
        GraphClient::with_base_url(TokenProvider::with_token("t"), "http://localhost:1234").unwrap()
    }

    #[test]
    fn url_joins_base_version_and_path() {
        let client = client();
        let req = GraphRequest::v1("/identity/conditionalAccess/namedLocations");
        assert_eq!(
            client.url(&req),
            "http://localhost:1234/v1.0/identity/conditionalAccess/namedLocations"
        );
        let req = GraphRequest::beta("users/u1/authentication/methods");
        assert_eq!(
            client.url(&req),
            "http://localhost:1234/beta/users/u1/authentication/methods"
        );
    }

    #[test]
    fn empty_valid_set_accepts_any_success() {
        let req = GraphRequest::v1("x");
        assert!(req.accepts(StatusCode::OK));
        assert!(req.accepts(StatusCode::NO_CONTENT));
        assert!(!req.accepts(StatusCode::NOT_FOUND));
    }

    #[test]
    fn explicit_valid_set_is_exact() {
        let req = GraphRequest::v1("x").expect(StatusCode::CREATED);
        assert!(req.accepts(StatusCode::CREATED));
        assert!(!req.accepts(StatusCode::OK));
    }

    #[test]
    fn bounded_query_disables_paging_even_after_policy_swap() {
        let query = Query {
            top: Some(1),
            ..Query::default()
        };
        let req = GraphRequest::v1("x")
            .with_query(&query)
            .with_policy(RequestPolicy::default());
        assert!(req.policy.disable_paging);

        let unbounded = GraphRequest::v1("x").with_query(&Query::default());
        assert!(!unbounded.policy.disable_paging);
    }

    #[test]
    fn with_consistency_replaces_check() {
        let req = GraphRequest::v1("x").with_consistency(ConsistencyCheck::Never);
        assert_eq!(req.policy.consistency.name(), "never");
    }

    #[test]
    fn next_link_must_stay_on_base_url() {
        let client = client();
        let visited = HashSet::new();
        assert!(client
            .check_next_link("http://localhost:1234/v1.0/groups?$skiptoken=2", &visited)
            .is_ok());
        let err = client
            .check_next_link("https://attacker.example/v1.0/groups?$skiptoken=2", &visited)
            .unwrap_err();
        assert!(matches!(err, GraphError::Paging { .. }));
    }

    #[test]
    fn repeated_next_link_is_refused() {
        let client = client();
        let link = "http://localhost:1234/v1.0/groups?$skiptoken=2".to_string();
        let visited = HashSet::from([link.clone()]);
        let err = client.check_next_link(&link, &visited).unwrap_err();
        assert!(matches!(err, GraphError::Paging { reason, .. } if reason.contains("repeats")));
    }

    #[test]
    fn api_version_segments() {
        assert_eq!(ApiVersion::V1.as_str(), "v1.0");
        assert_eq!(ApiVersion::Beta.as_str(), "beta");
    }
}
