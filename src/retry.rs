//! Per-request paging and consistency-failure retry policy.
//!
//! Microsoft Graph is eventually consistent. An object created a moment
//! ago may still answer `404`, and a group that just had a feature enabled
//! may still reject calls with `401`. Each request therefore carries a
//! [`RequestPolicy`] describing:
//!
//! - whether the client should follow `@odata.nextLink` or return exactly
//!   one page (`disable_paging`), and
//! - a [`ConsistencyCheck`] deciding whether a non-success response is a
//!   propagation-lag symptom worth retrying.
//!
//! Each check matches an exact status code or an exact OData error code.
//! Retries stop at [`RetryConfig::max_attempts`] and the last response is
//! then reported to the caller unchanged.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::odata::{ODataError, Query};

/// The parts of an HTTP response a consistency check may inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    /// Response status code.
    pub status: StatusCode,
    /// Value of the `request-id` header, when present.
    pub request_id: Option<String>,
}

impl ResponseMeta {
    /// Metadata for a bare status, used mostly in tests.
    pub fn with_status(status: StatusCode) -> Self {
        ResponseMeta {
            status,
            request_id: None,
        }
    }
}

/// Signature of a caller-supplied consistency check.
pub type ConsistencyFn = fn(&ResponseMeta, Option<&ODataError>) -> bool;

/// Decides whether a failed response should be retried.
#[derive(Clone, Copy, Default)]
pub enum ConsistencyCheck {
    /// Retry on `404 Not Found`. Absorbs read-after-create lag and is the
    /// default for most endpoints.
    #[default]
    NotFound,
    /// Retry when the OData error code equals the given string exactly,
    /// whatever the status. Used e.g. with `ResourceDoesNotExist` when
    /// assigning a resource to a group that was only just created.
    ErrorCode(&'static str),
    /// Retry on `401 Unauthorized` when Graph also returned an OData
    /// error body. Seen right after enabling a feature on a new group.
    UnauthorizedWithError,
    /// Never retry.
    Never,
    /// Caller-supplied check.
    Custom(ConsistencyFn),
}

impl ConsistencyCheck {
    /// Applies the check to a response.
    pub fn should_retry(&self, response: &ResponseMeta, error: Option<&ODataError>) -> bool {
        match self {
            ConsistencyCheck::NotFound => response.status == StatusCode::NOT_FOUND,
            ConsistencyCheck::ErrorCode(code) => {
                error.and_then(ODataError::code) == Some(*code)
            }
            ConsistencyCheck::UnauthorizedWithError => {
                response.status == StatusCode::UNAUTHORIZED && error.is_some()
            }
            ConsistencyCheck::Never => false,
            ConsistencyCheck::Custom(check) => check(response, error),
        }
    }

    /// Short name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            ConsistencyCheck::NotFound => "not_found",
            ConsistencyCheck::ErrorCode(_) => "error_code",
            ConsistencyCheck::UnauthorizedWithError => "unauthorized_with_error",
            ConsistencyCheck::Never => "never",
            ConsistencyCheck::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for ConsistencyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyCheck::ErrorCode(code) => f.debug_tuple("ErrorCode").field(code).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Attempt limits and backoff shared by every request a client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts per request, including the first. `1` disables
    /// consistency retries entirely.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles on every further retry.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Creates a config with the given limits.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        RetryConfig {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Delay to wait after the given 1-based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Paging and retry behavior for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestPolicy {
    /// Return only the first page instead of following `@odata.nextLink`.
    pub disable_paging: bool,
    /// Which failed responses count as consistency lag.
    pub consistency: ConsistencyCheck,
    /// Aborts the in-flight send or retry backoff when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl RequestPolicy {
    /// Default policy, with paging disabled when `query` sets `$top`.
    pub fn for_query(query: &Query) -> Self {
        RequestPolicy {
            disable_paging: query.bounds_results(),
            ..RequestPolicy::default()
        }
    }

    /// Replaces the consistency check.
    pub fn with_consistency(mut self, consistency: ConsistencyCheck) -> Self {
        self.consistency = consistency;
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Forces single-page responses.
    pub fn without_paging(mut self) -> Self {
        self.disable_paging = true;
        self
    }

    /// Whether the attached token (if any) has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
