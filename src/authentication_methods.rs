//! Authentication methods registered for a user.
//!
//! `GET /users/{id}/authentication/methods` returns every method a user has
//! registered in one array. Each element is one of seven concrete shapes
//! named by `@odata.type`, so [`list_authentication_methods`] decodes the
//! array through the [`AuthenticationMethod`] registry. Unrecognized method
//! types (Graph adds new ones from time to time) are dropped from the
//! result rather than failing the call.
//!
//! Each method kind also has its own endpoint family under
//! `/users/{id}/authentication/{segment}`. Those are exposed generically
//! over the [`MethodKind`] trait. Marker traits restrict create, update and
//! delete to the kinds Graph supports them for:
//!
//! | Kind | list/get | create | update | delete |
//! |------|----------|--------|--------|--------|
//! | FIDO2 | yes | | | yes |
//! | Microsoft Authenticator | yes | | | yes |
//! | Windows Hello for Business | yes | | | yes |
//! | Temporary Access Pass | yes | yes | | yes |
//! | Phone | yes | yes | yes | yes |
//! | Email | yes | yes | yes | yes |
//! | Password | yes | | | |
//!
//! All endpoints use the `beta` API and require
//! `UserAuthenticationMethod.ReadWrite.All`.

use once_cell::sync::Lazy;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::{GraphClient, GraphRequest};
use crate::decode::{Discriminated, VariantRegistry};
use crate::odata::Query;

// ── Models ─────────────────────────────────────────────────────────────

/// A FIDO2 security key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fido2AuthenticationMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    /// Authenticator Attestation GUID of the key model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aa_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attestation_certificates: Vec<String>,
    /// `attested` or `notAttested`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_level: Option<String>,
}

/// The Microsoft Authenticator app on a device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftAuthenticatorAuthenticationMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_app_version: Option<String>,
}

/// A Windows Hello for Business key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowsHelloForBusinessAuthenticationMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    /// `normal`, `weak` or `unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_strength: Option<String>,
}

/// A time-limited passcode.
///
/// `temporary_access_pass` is only populated in the response to the
/// create call. Later reads omit it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryAccessPassAuthenticationMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_access_pass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_in_minutes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_usable_once: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_usable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_usability_reason: Option<String>,
}

/// Which phone slot a number occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhoneType {
    Mobile,
    AlternateMobile,
    Office,
    /// A phone type this crate does not know yet.
    #[serde(other)]
    Unknown,
}

/// A phone number used for SMS or voice verification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneAuthenticationMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// E.164-ish number, e.g. `+1 2065555555`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_type: Option<PhoneType>,
    /// `ready`, `notSupported`, `notAllowedByPolicy`, `notEnabled`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_sign_in_state: Option<String>,
}

/// An email address used for self-service password reset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAuthenticationMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

/// The user's password. Graph never returns the password itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordAuthenticationMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
}

/// One registered authentication method of any supported kind.
///
/// Serializes with its `@odata.type` discriminator. Decoding goes through
/// the registry (see [`crate::decode`]) rather than `Deserialize`, so that
/// unknown kinds can be skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "@odata.type")]
pub enum AuthenticationMethod {
    #[serde(rename = "#microsoft.graph.fido2AuthenticationMethod")]
    Fido2(Fido2AuthenticationMethod),
    #[serde(rename = "#microsoft.graph.microsoftAuthenticatorAuthenticationMethod")]
    MicrosoftAuthenticator(MicrosoftAuthenticatorAuthenticationMethod),
    #[serde(rename = "#microsoft.graph.windowsHelloForBusinessAuthenticationMethod")]
    WindowsHelloForBusiness(WindowsHelloForBusinessAuthenticationMethod),
    #[serde(rename = "#microsoft.graph.temporaryAccessPassAuthenticationMethod")]
    TemporaryAccessPass(TemporaryAccessPassAuthenticationMethod),
    #[serde(rename = "#microsoft.graph.phoneAuthenticationMethod")]
    Phone(PhoneAuthenticationMethod),
    #[serde(rename = "#microsoft.graph.emailAuthenticationMethod")]
    Email(EmailAuthenticationMethod),
    #[serde(rename = "#microsoft.graph.passwordAuthenticationMethod")]
    Password(PasswordAuthenticationMethod),
}

impl AuthenticationMethod {
    /// The method's Graph ID.
    pub fn id(&self) -> Option<&str> {
        match self {
            AuthenticationMethod::Fido2(m) => m.id.as_deref(),
            AuthenticationMethod::MicrosoftAuthenticator(m) => m.id.as_deref(),
            AuthenticationMethod::WindowsHelloForBusiness(m) => m.id.as_deref(),
            AuthenticationMethod::TemporaryAccessPass(m) => m.id.as_deref(),
            AuthenticationMethod::Phone(m) => m.id.as_deref(),
            AuthenticationMethod::Email(m) => m.id.as_deref(),
            AuthenticationMethod::Password(m) => m.id.as_deref(),
        }
    }
}

static AUTHENTICATION_METHODS: Lazy<VariantRegistry<AuthenticationMethod>> = Lazy::new(|| {
    VariantRegistry::new("authentication_method")
        .with_variant(
            Fido2AuthenticationMethod::ODATA_TYPE,
            AuthenticationMethod::Fido2,
        )
        .with_variant(
            MicrosoftAuthenticatorAuthenticationMethod::ODATA_TYPE,
            AuthenticationMethod::MicrosoftAuthenticator,
        )
        .with_variant(
            WindowsHelloForBusinessAuthenticationMethod::ODATA_TYPE,
            AuthenticationMethod::WindowsHelloForBusiness,
        )
        .with_variant(
            TemporaryAccessPassAuthenticationMethod::ODATA_TYPE,
            AuthenticationMethod::TemporaryAccessPass,
        )
        .with_variant(
            PhoneAuthenticationMethod::ODATA_TYPE,
            AuthenticationMethod::Phone,
        )
        .with_variant(
            EmailAuthenticationMethod::ODATA_TYPE,
            AuthenticationMethod::Email,
        )
        .with_variant(
            PasswordAuthenticationMethod::ODATA_TYPE,
            AuthenticationMethod::Password,
        )
});

impl Discriminated for AuthenticationMethod {
    fn registry() -> &'static VariantRegistry<Self> {
        &AUTHENTICATION_METHODS
    }
}

// ── Per-kind endpoint families ─────────────────────────────────────────

/// A concrete method kind with its own endpoint family.
pub trait MethodKind: Serialize + DeserializeOwned {
    /// Path segment under `/users/{id}/authentication/`.
    const SEGMENT: &'static str;
    /// The `@odata.type` discriminator of this kind.
    const ODATA_TYPE: &'static str;
}

/// Kinds that can be removed from a user.
pub trait Deletable: MethodKind {}
/// Kinds that can be registered for a user through Graph.
pub trait Creatable: MethodKind {}
/// Kinds whose properties can be changed in place.
pub trait Updatable: MethodKind {}

macro_rules! method_kind {
    ($ty:ty, $segment:literal, $odata:literal) => {
        impl MethodKind for $ty {
            const SEGMENT: &'static str = $segment;
            const ODATA_TYPE: &'static str = $odata;
        }
    };
}

method_kind!(
    Fido2AuthenticationMethod,
    "fido2Methods",
    "#microsoft.graph.fido2AuthenticationMethod"
);
method_kind!(
    MicrosoftAuthenticatorAuthenticationMethod,
    "microsoftAuthenticatorMethods",
    "#microsoft.graph.microsoftAuthenticatorAuthenticationMethod"
);
method_kind!(
    WindowsHelloForBusinessAuthenticationMethod,
    "windowsHelloForBusinessMethods",
    "#microsoft.graph.windowsHelloForBusinessAuthenticationMethod"
);
method_kind!(
    TemporaryAccessPassAuthenticationMethod,
    "temporaryAccessPassMethods",
    "#microsoft.graph.temporaryAccessPassAuthenticationMethod"
);
method_kind!(
    PhoneAuthenticationMethod,
    "phoneMethods",
    "#microsoft.graph.phoneAuthenticationMethod"
);
method_kind!(
    EmailAuthenticationMethod,
    "emailMethods",
    "#microsoft.graph.emailAuthenticationMethod"
);
method_kind!(
    PasswordAuthenticationMethod,
    "passwordMethods",
    "#microsoft.graph.passwordAuthenticationMethod"
);

impl Deletable for Fido2AuthenticationMethod {}
impl Deletable for MicrosoftAuthenticatorAuthenticationMethod {}
impl Deletable for WindowsHelloForBusinessAuthenticationMethod {}
impl Deletable for TemporaryAccessPassAuthenticationMethod {}
impl Deletable for PhoneAuthenticationMethod {}
impl Deletable for EmailAuthenticationMethod {}

impl Creatable for TemporaryAccessPassAuthenticationMethod {}
impl Creatable for PhoneAuthenticationMethod {}
impl Creatable for EmailAuthenticationMethod {}

impl Updatable for PhoneAuthenticationMethod {}
impl Updatable for EmailAuthenticationMethod {}

fn methods_path(user_id: &str) -> String {
    format!("users/{user_id}/authentication/methods")
}

fn kind_path<M: MethodKind>(user_id: &str, method_id: Option<&str>) -> String {
    match method_id {
        Some(id) => format!("users/{user_id}/authentication/{}/{id}", M::SEGMENT),
        None => format!("users/{user_id}/authentication/{}", M::SEGMENT),
    }
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Lists every authentication method registered for a user.
///
/// Elements whose `@odata.type` is missing or not one of the seven known
/// kinds are silently left out.
///
/// # Errors
///
/// - `GraphError::Api`: non-success status. A 404 is retried first, since
///   a freshly created user may not be visible yet.
/// - `GraphError::Decode`: a known kind had an unexpected shape.
/// - `GraphError::Auth` / `GraphError::Network`: auth or transport failure.
pub async fn list_authentication_methods(
    client: &GraphClient,
    user_id: &str,
    query: &Query,
) -> crate::error::Result<(Vec<AuthenticationMethod>, StatusCode)> {
    let request = GraphRequest::beta(methods_path(user_id))
        .with_query(query)
        .expect(StatusCode::OK);
    client.list_discriminated(&request).await
}

/// Lists a user's methods of one kind.
pub async fn list_methods<M: MethodKind>(
    client: &GraphClient,
    user_id: &str,
    query: &Query,
) -> crate::error::Result<(Vec<M>, StatusCode)> {
    let request = GraphRequest::beta(kind_path::<M>(user_id, None))
        .with_query(query)
        .expect(StatusCode::OK);
    client.list(&request).await
}

/// Retrieves one method of a known kind.
pub async fn get_method<M: MethodKind>(
    client: &GraphClient,
    user_id: &str,
    method_id: &str,
) -> crate::error::Result<(M, StatusCode)> {
    let request = GraphRequest::beta(kind_path::<M>(user_id, Some(method_id))).expect(StatusCode::OK);
    client.get(&request).await
}

/// Registers a new method and returns it as Graph stored it.
///
/// For a Temporary Access Pass, this response is the only place the pass
/// itself is ever returned.
pub async fn create_method<M: Creatable>(
    client: &GraphClient,
    user_id: &str,
    method: &M,
) -> crate::error::Result<(M, StatusCode)> {
    let request = GraphRequest::beta(kind_path::<M>(user_id, None)).expect(StatusCode::CREATED);
    client.post(&request, method).await
}

/// Updates a method in place. Only the fields set on `method` change.
pub async fn update_method<M: Updatable>(
    client: &GraphClient,
    user_id: &str,
    method_id: &str,
    method: &M,
) -> crate::error::Result<StatusCode> {
    let request = GraphRequest::beta(kind_path::<M>(user_id, Some(method_id)))
        .expect(StatusCode::NO_CONTENT);
    client.patch(&request, method).await
}

/// Removes a method from the user.
pub async fn delete_method<M: Deletable>(
    client: &GraphClient,
    user_id: &str,
    method_id: &str,
) -> crate::error::Result<StatusCode> {
    let request = GraphRequest::beta(kind_path::<M>(user_id, Some(method_id)))
        .expect(StatusCode::NO_CONTENT);
    client.delete(&request).await
}

/// Allows the phone method to be used for SMS sign-in.
pub async fn enable_sms_sign_in(
    client: &GraphClient,
    user_id: &str,
    method_id: &str,
) -> crate::error::Result<StatusCode> {
    sms_sign_in_action(client, user_id, method_id, "enableSmsSignIn").await
}

/// Stops the phone method from being used for SMS sign-in.
pub async fn disable_sms_sign_in(
    client: &GraphClient,
    user_id: &str,
    method_id: &str,
) -> crate::error::Result<StatusCode> {
    sms_sign_in_action(client, user_id, method_id, "disableSmsSignIn").await
}

async fn sms_sign_in_action(
    client: &GraphClient,
    user_id: &str,
    method_id: &str,
    action: &str,
) -> crate::error::Result<StatusCode> {
    let path = format!(
        "{}/{action}",
        kind_path::<PhoneAuthenticationMethod>(user_id, Some(method_id))
    );
    let request = GraphRequest::beta(path).expect(StatusCode::NO_CONTENT);
    client.post_empty::<()>(&request, None).await
}
