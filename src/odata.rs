//! OData conventions used by Microsoft Graph.
//!
//! - [`ODataList`]: the `{ "value": [...], "@odata.nextLink": ... }`
//!   collection envelope.
//! - [`ODataError`]: the `{ "error": { "code", "message", ... } }` error
//!   envelope, parsed from non-success response bodies so retry predicates
//!   and callers can match on `code`.
//! - [`Query`]: system query options (`$filter`, `$select`, `$top`, ...)
//!   and the `ConsistencyLevel` header required by advanced queries.

use serde::{Deserialize, Serialize};

/// JSON key carrying the type discriminator on polymorphic payloads.
pub const ODATA_TYPE: &str = "@odata.type";

/// JSON key carrying the absolute URL of the next page.
pub const ODATA_NEXT_LINK: &str = "@odata.nextLink";

/// OData collection wrapper returned by list endpoints.
#[derive(Debug, Deserialize)]
pub struct ODataList<T> {
    /// The items on this page.
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,

    /// Absolute URL of the next page, absent on the last page.
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,

    /// Total item count, present only when `$count=true` was requested.
    #[serde(rename = "@odata.count", default)]
    pub count: Option<i64>,
}

/// The `innerError` block Graph attaches to most error responses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InnerError {
    /// Server timestamp of the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Graph request ID, useful when raising support cases.
    #[serde(rename = "request-id", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Echo of the `client-request-id` header, if one was sent.
    #[serde(rename = "client-request-id", default, skip_serializing_if = "Option::is_none")]
    pub client_request_id: Option<String>,
}

/// A parsed OData error.
///
/// Only `code` participates in retry decisions. Codes are compared
/// exactly, never by prefix or substring.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ODataError {
    /// Machine-readable error code (e.g. `Request_ResourceNotFound`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Diagnostic identifiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_error: Option<InnerError>,

    /// Additional per-target errors, used by validation failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ODataError>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ODataError,
}

impl ODataError {
    /// Parses the error envelope out of a response body.
    ///
    /// Returns `None` for empty bodies, non-JSON bodies (gateway HTML
    /// pages, for instance) and JSON without an `error` object.
    pub fn from_body(body: &str) -> Option<Self> {
        if body.trim().is_empty() {
            return None;
        }
        serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error)
    }

    /// The error code, if Graph supplied one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

/// OData system query options for a single request.
///
/// ```ignore
/// let query = Query {
///     filter: Some("displayName eq 'Corp'".into()),
///     top: Some(10),
///     ..Query::default()
/// };
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// `$filter` expression.
    pub filter: Option<String>,
    /// `$select` properties, joined with commas.
    pub select: Vec<String>,
    /// `$expand` navigation properties, joined with commas.
    pub expand: Vec<String>,
    /// `$orderby` expression.
    pub order_by: Option<String>,
    /// `$search` expression, sent verbatim (callers supply the quotes).
    pub search: Option<String>,
    /// `$top` page size. A positive value bounds the result to one page.
    pub top: Option<u32>,
    /// Adds `$count=true`.
    pub count: bool,
    /// Adds the `ConsistencyLevel: eventual` header needed by `$count`,
    /// `$search` and some `$filter` forms on directory objects.
    pub eventual_consistency: bool,
}

impl Query {
    /// Query string pairs in a stable order.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(filter) = &self.filter {
            pairs.push(("$filter", filter.clone()));
        }
        if !self.select.is_empty() {
            pairs.push(("$select", self.select.join(",")));
        }
        if !self.expand.is_empty() {
            pairs.push(("$expand", self.expand.join(",")));
        }
        if let Some(order_by) = &self.order_by {
            pairs.push(("$orderby", order_by.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("$search", search.clone()));
        }
        if let Some(top) = self.top {
            pairs.push(("$top", top.to_string()));
        }
        if self.count {
            pairs.push(("$count", "true".to_string()));
        }
        pairs
    }

    /// Extra request headers implied by this query.
    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        if self.eventual_consistency {
            vec![("ConsistencyLevel", "eventual")]
        } else {
            Vec::new()
        }
    }

    /// True when the caller explicitly bounded the page size.
    pub fn bounds_results(&self) -> bool {
        self.top.is_some_and(|top| top > 0)
    }
}
