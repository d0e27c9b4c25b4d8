//! Typed async client for Microsoft Graph identity and device-management
//! endpoints.
//!
//! Two pieces carry the logic:
//! - A discriminated-type decoder that turns polymorphic OData arrays into
//!   closed Rust enums by reading each element's `@odata.type`, recursing
//!   into nested child settings.
//! - A request policy that follows `@odata.nextLink` and retries the
//!   transient errors Graph returns while a freshly created object
//!   replicates.
//!
//! # Modules
//!
//! - [`auth`]: OAuth2 client credentials token provider with expiry tracking.
//! - [`client`]: Authenticated HTTP wrapper with paging and consistency retry.
//! - [`config`]: TOML and environment configuration.
//! - [`decode`]: Variant registries and discriminated decoding.
//! - [`error`]: Typed error hierarchy (`GraphError`).
//! - [`odata`]: Collection envelopes, error bodies, and query options.
//! - [`retry`]: Consistency checks, backoff limits, and request policy.
//! - [`authentication_methods`]: Per-user authentication methods (beta).
//! - [`named_locations`]: Conditional Access named locations.
//! - [`configuration_policies`]: Intune settings catalog policies (beta).
//!
//! # Quick Start
//!
//! ```ignore
//! use msgraph_typed::auth::{GRAPH_DEFAULT_SCOPE, TokenProvider};
//! use msgraph_typed::authentication_methods::list_authentication_methods;
//! use msgraph_typed::client::GraphClient;
//! use msgraph_typed::odata::Query;
//!
//! let tp = TokenProvider::new("tenant", "client_id", "secret", GRAPH_DEFAULT_SCOPE);
//! let client = GraphClient::new(tp)?;
//! let (methods, _) = list_authentication_methods(&client, "user@contoso.com", &Query::default()).await?;
//! ```

pub mod auth;
pub mod authentication_methods;
pub mod client;
pub mod config;
pub mod configuration_policies;
pub mod decode;
pub mod error;
pub mod named_locations;
pub mod odata;
pub mod retry;
