//! Conditional Access named locations.
//!
//! `/identity/conditionalAccess/namedLocations` mixes two shapes in one
//! collection:
//! - [`IpNamedLocation`] (`#microsoft.graph.ipNamedLocation`), a set of CIDR
//!   ranges. The ranges are polymorphic too (IPv4 or IPv6), and decode
//!   through their own [`IpRange`] registry.
//! - [`CountryNamedLocation`] (`#microsoft.graph.countryNamedLocation`), a
//!   set of ISO 3166 country codes.
//!
//! Graph requires `@odata.type` on create and update bodies, so writes
//! go through the tagged [`NamedLocation`] serializer.
//!
//! Requires `Policy.ReadWrite.ConditionalAccess`.

use once_cell::sync::Lazy;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::client::{GraphClient, GraphRequest};
use crate::decode::{self, Discriminated, VariantRegistry, decode_single};
use crate::odata::Query;

const NAMED_LOCATIONS: &str = "identity/conditionalAccess/namedLocations";

/// A CIDR block such as `12.34.221.11/22`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidrRange {
    pub cidr_address: String,
}

/// One range of an IP named location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "@odata.type")]
pub enum IpRange {
    #[serde(rename = "#microsoft.graph.iPv4CidrRange")]
    V4(CidrRange),
    #[serde(rename = "#microsoft.graph.iPv6CidrRange")]
    V6(CidrRange),
}

impl IpRange {
    /// The CIDR text of either family.
    pub fn cidr(&self) -> &str {
        match self {
            IpRange::V4(range) | IpRange::V6(range) => &range.cidr_address,
        }
    }
}

static IP_RANGES: Lazy<VariantRegistry<IpRange>> = Lazy::new(|| {
    VariantRegistry::new("ip_range")
        .with_variant("#microsoft.graph.iPv4CidrRange", IpRange::V4)
        .with_variant("#microsoft.graph.iPv6CidrRange", IpRange::V6)
});

impl Discriminated for IpRange {
    fn registry() -> &'static VariantRegistry<Self> {
        &IP_RANGES
    }
}

/// A named location defined by IP ranges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpNamedLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trusted: Option<bool>,
    #[serde(default, deserialize_with = "decode::children")]
    pub ip_ranges: Vec<IpRange>,
}

/// A named location defined by countries or regions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryNamedLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_date_time: Option<String>,
    /// Two-letter ISO 3166 codes.
    #[serde(default)]
    pub countries_and_regions: Vec<String>,
    /// `clientIpAddress` or `authenticatorAppGps`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_lookup_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_unknown_countries_and_regions: Option<bool>,
}

/// A named location of either kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "@odata.type")]
pub enum NamedLocation {
    #[serde(rename = "#microsoft.graph.ipNamedLocation")]
    Ip(IpNamedLocation),
    #[serde(rename = "#microsoft.graph.countryNamedLocation")]
    Country(CountryNamedLocation),
}

impl NamedLocation {
    /// The location's Graph ID.
    pub fn id(&self) -> Option<&str> {
        match self {
            NamedLocation::Ip(loc) => loc.id.as_deref(),
            NamedLocation::Country(loc) => loc.id.as_deref(),
        }
    }

    /// The location's display name.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            NamedLocation::Ip(loc) => loc.display_name.as_deref(),
            NamedLocation::Country(loc) => loc.display_name.as_deref(),
        }
    }
}

static NAMED_LOCATION_TYPES: Lazy<VariantRegistry<NamedLocation>> = Lazy::new(|| {
    VariantRegistry::new("named_location")
        .with_variant("#microsoft.graph.ipNamedLocation", NamedLocation::Ip)
        .with_variant("#microsoft.graph.countryNamedLocation", NamedLocation::Country)
});

impl Discriminated for NamedLocation {
    fn registry() -> &'static VariantRegistry<Self> {
        &NAMED_LOCATION_TYPES
    }
}

/// Tagged borrowed view used for request bodies.
#[derive(Serialize)]
#[serde(tag = "@odata.type")]
enum NamedLocationBody<'a> {
    #[serde(rename = "#microsoft.graph.ipNamedLocation")]
    Ip(&'a IpNamedLocation),
    #[serde(rename = "#microsoft.graph.countryNamedLocation")]
    Country(&'a CountryNamedLocation),
}

fn location_path(id: &str) -> String {
    format!("{NAMED_LOCATIONS}/{id}")
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Lists named locations of both kinds.
///
/// Locations of any future kind are left out of the result.
pub async fn list_named_locations(
    client: &GraphClient,
    query: &Query,
) -> crate::error::Result<(Vec<NamedLocation>, StatusCode)> {
    let request = GraphRequest::v1(NAMED_LOCATIONS)
        .with_query(query)
        .expect(StatusCode::OK);
    client.list_discriminated(&request).await
}

/// Retrieves one named location.
///
/// Returns `None` when the object carries no `@odata.type` this crate
/// knows.
pub async fn get_named_location(
    client: &GraphClient,
    id: &str,
    query: &Query,
) -> crate::error::Result<(Option<NamedLocation>, StatusCode)> {
    let request = GraphRequest::v1(location_path(id))
        .with_query(query)
        .expect(StatusCode::OK);
    let (raw, status) = client.get_raw(&request).await?;
    Ok((decode_single(NamedLocation::registry(), &raw)?, status))
}

/// Creates an IP named location.
pub async fn create_ip_named_location(
    client: &GraphClient,
    location: &IpNamedLocation,
) -> crate::error::Result<(IpNamedLocation, StatusCode)> {
    let request = GraphRequest::v1(NAMED_LOCATIONS).expect(StatusCode::CREATED);
    client.post(&request, &NamedLocationBody::Ip(location)).await
}

/// Creates a country named location.
pub async fn create_country_named_location(
    client: &GraphClient,
    location: &CountryNamedLocation,
) -> crate::error::Result<(CountryNamedLocation, StatusCode)> {
    let request = GraphRequest::v1(NAMED_LOCATIONS).expect(StatusCode::CREATED);
    client.post(&request, &NamedLocationBody::Country(location)).await
}

/// Updates an IP named location. `ip_ranges` replaces the existing set.
pub async fn update_ip_named_location(
    client: &GraphClient,
    id: &str,
    location: &IpNamedLocation,
) -> crate::error::Result<StatusCode> {
    let request = GraphRequest::v1(location_path(id)).expect(StatusCode::NO_CONTENT);
    client.patch(&request, &NamedLocationBody::Ip(location)).await
}

/// Updates a country named location.
pub async fn update_country_named_location(
    client: &GraphClient,
    id: &str,
    location: &CountryNamedLocation,
) -> crate::error::Result<StatusCode> {
    let request = GraphRequest::v1(location_path(id)).expect(StatusCode::NO_CONTENT);
    client.patch(&request, &NamedLocationBody::Country(location)).await
}

/// Deletes a named location.
///
/// Graph refuses with 400 while a Conditional Access policy still
/// references the location. That is not retried.
pub async fn delete_named_location(client: &GraphClient, id: &str) -> crate::error::Result<StatusCode> {
    let request = GraphRequest::v1(location_path(id)).expect(StatusCode::NO_CONTENT);
    client.delete(&request).await
}
