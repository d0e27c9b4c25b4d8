//! Typed error hierarchy for the msgraph-typed crate.
//!
//! Every variant maps to a real system boundary rather than an internal
//! detail:
//! - `Auth` covers the Microsoft identity platform token endpoint.
//! - `Api` covers Graph responses whose status was not in the caller's
//!   declared valid set. It keeps the raw body and, when the body parsed,
//!   the OData error so callers can branch on `error.code`.
//! - `Decode` covers a polymorphic element whose discriminator matched but
//!   whose body did not fit the concrete type.
//! - `Parse` covers any other response body that failed to deserialize.
//! - `Network` wraps `reqwest::Error` for failures with no HTTP status.
//! - `Config` covers configuration file and environment problems.
//! - `Paging` covers an `@odata.nextLink` the client refuses to follow:
//!   one already visited, or one outside the configured endpoint.
//! - `Cancelled` is returned when the request's cancellation token fires,
//!   either mid-request or while waiting to retry.
//!
//! Consistency-failure retries (see [`crate::retry`]) never surface as a
//! distinct variant. Once attempts are exhausted the last response is
//! reported as an ordinary `Api` error.

use reqwest::StatusCode;

use crate::decode::DecodeError;
use crate::odata::ODataError;

/// Unified error type for all msgraph-typed operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Authentication failure at the token endpoint.
    ///
    /// Covers non-2xx token responses (the `message` carries the AADSTS
    /// code and description), transport failures reaching the endpoint,
    /// and a missing token after a refresh.
    #[error("authentication failed: {message}")]
    Auth {
        /// Human-readable description, including HTTP status and the
        /// identity platform error body when available.
        message: String,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Graph returned a status outside the request's valid set.
    #[error("API error {status}: {body}")]
    Api {
        /// The HTTP status code returned by Graph.
        status: StatusCode,
        /// The raw response body text, empty if it could not be read.
        body: String,
        /// The parsed OData error envelope, when the body contained one.
        odata: Option<ODataError>,
    },

    /// A discriminated element could not be decoded into its variant.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// JSON deserialization of a response body failed.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport-level failure (DNS, TCP, TLS, timeout, redirect loop).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Configuration could not be loaded or is incomplete.
    #[error("configuration error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
        /// The underlying I/O or TOML error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A collection's next link was refused.
    #[error("paging stopped at {link}: {reason}")]
    Paging {
        /// The refused `@odata.nextLink`.
        link: String,
        /// Why it was refused.
        reason: &'static str,
    },

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

impl GraphError {
    /// Returns the HTTP status associated with this error, if any.
    ///
    /// Mirrors the `(result, status, error)` shape Graph callers expect:
    /// an `Api` error carries the status Graph sent, a `Network` error
    /// carries one only when reqwest recorded it.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GraphError::Api { status, .. } => Some(*status),
            GraphError::Network(err) => err.status(),
            _ => None,
        }
    }

    /// Returns the OData error code of an `Api` error, if one was parsed.
    pub fn odata_code(&self) -> Option<&str> {
        match self {
            GraphError::Api { odata, .. } => odata.as_ref().and_then(|o| o.code()),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, GraphError>;
