//! Intune settings catalog policies (`/deviceManagement/configurationPolicies`, beta).
//!
//! A policy holds a list of settings. Each setting wraps one setting
//! instance whose shape is chosen by `@odata.type`:
//!
//! | Discriminator suffix                 | Variant                       |
//! |--------------------------------------|-------------------------------|
//! | `SettingInstance`                    | [`BaseSettingInstance`]       |
//! | `GroupSettingCollectionInstance`     | [`GroupSettingCollectionInstance`] |
//! | `ChoiceSettingInstance`              | [`ChoiceSettingInstance`]     |
//! | `SimpleSettingInstance`              | [`SimpleSettingInstance`]     |
//!
//! Group collections and choices own `children` arrays of further
//! instances, decoded recursively through the same registry.
//!
//! Requires `DeviceManagementConfiguration.ReadWrite.All`.

use once_cell::sync::Lazy;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{GraphClient, GraphRequest};
use crate::decode::{self, Discriminated, VariantRegistry};
use crate::odata::{ODataList, Query};
use crate::retry::ConsistencyCheck;

const CONFIGURATION_POLICIES: &str = "deviceManagement/configurationPolicies";

const BASE_INSTANCE: &str = "#microsoft.graph.deviceManagementConfigurationSettingInstance";
const GROUP_COLLECTION_INSTANCE: &str =
    "#microsoft.graph.deviceManagementConfigurationGroupSettingCollectionInstance";
const CHOICE_INSTANCE: &str = "#microsoft.graph.deviceManagementConfigurationChoiceSettingInstance";
const SIMPLE_INSTANCE: &str = "#microsoft.graph.deviceManagementConfigurationSimpleSettingInstance";

/// Links an instance to a policy template.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingInstanceTemplateReference {
    #[serde(default)]
    pub setting_instance_template_id: String,
}

/// Links a value to a policy template.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingValueTemplateReference {
    #[serde(default)]
    pub setting_value_template_id: String,
    #[serde(default)]
    pub use_template_default: bool,
}

/// An instance with no value of its own.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseSettingInstance {
    pub setting_definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_instance_template_reference: Option<SettingInstanceTemplateReference>,
}

/// One entry of a group setting collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettingValue {
    #[serde(rename = "@odata.type", default, skip_serializing_if = "Option::is_none")]
    pub odata_type: Option<String>,
    #[serde(default, deserialize_with = "decode::children")]
    pub children: Vec<SettingInstance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_value_template_reference: Option<SettingValueTemplateReference>,
}

/// A list of grouped child settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettingCollectionInstance {
    pub setting_definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_instance_template_reference: Option<SettingInstanceTemplateReference>,
    #[serde(default)]
    pub group_setting_collection_value: Vec<GroupSettingValue>,
}

/// The selected option of a choice setting and the settings it enables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceSettingValue {
    #[serde(rename = "@odata.type", default, skip_serializing_if = "Option::is_none")]
    pub odata_type: Option<String>,
    /// Option ID, e.g. `device_vendor_msft_..._1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "decode::children")]
    pub children: Vec<SettingInstance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_value_template_reference: Option<SettingValueTemplateReference>,
}

/// A setting choosing one option.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceSettingInstance {
    pub setting_definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_instance_template_reference: Option<SettingInstanceTemplateReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_setting_value: Option<ChoiceSettingValue>,
}

/// A string, integer, or secret value.
///
/// `@odata.type` names the value kind
/// (`#microsoft.graph.deviceManagementConfigurationStringSettingValue` and
/// friends), so `value` stays untyped JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleSettingValue {
    #[serde(rename = "@odata.type", default, skip_serializing_if = "Option::is_none")]
    pub odata_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Set on secret values: `encryptedValueToken`, `notEncrypted`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_value_template_reference: Option<SettingValueTemplateReference>,
}

/// A setting holding a single scalar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleSettingInstance {
    pub setting_definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_instance_template_reference: Option<SettingInstanceTemplateReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_setting_value: Option<SimpleSettingValue>,
}

/// A setting instance of any supported kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "@odata.type")]
pub enum SettingInstance {
    #[serde(rename = "#microsoft.graph.deviceManagementConfigurationSettingInstance")]
    Base(BaseSettingInstance),
    #[serde(rename = "#microsoft.graph.deviceManagementConfigurationGroupSettingCollectionInstance")]
    GroupSettingCollection(GroupSettingCollectionInstance),
    #[serde(rename = "#microsoft.graph.deviceManagementConfigurationChoiceSettingInstance")]
    Choice(ChoiceSettingInstance),
    #[serde(rename = "#microsoft.graph.deviceManagementConfigurationSimpleSettingInstance")]
    Simple(SimpleSettingInstance),
}

impl SettingInstance {
    /// The setting definition this instance configures.
    pub fn setting_definition_id(&self) -> &str {
        match self {
            SettingInstance::Base(s) => &s.setting_definition_id,
            SettingInstance::GroupSettingCollection(s) => &s.setting_definition_id,
            SettingInstance::Choice(s) => &s.setting_definition_id,
            SettingInstance::Simple(s) => &s.setting_definition_id,
        }
    }

    /// Direct children in document order. Group collections yield the
    /// children of every entry, one entry after another.
    pub fn children(&self) -> Vec<&SettingInstance> {
        match self {
            SettingInstance::GroupSettingCollection(s) => s
                .group_setting_collection_value
                .iter()
                .flat_map(|v| v.children.iter())
                .collect(),
            SettingInstance::Choice(s) => s
                .choice_setting_value
                .iter()
                .flat_map(|v| v.children.iter())
                .collect(),
            SettingInstance::Base(_) | SettingInstance::Simple(_) => Vec::new(),
        }
    }

    /// Levels in this instance's tree, counting itself.
    pub fn depth(&self) -> usize {
        1 + self.children().into_iter().map(Self::depth).max().unwrap_or(0)
    }
}

static SETTING_INSTANCES: Lazy<VariantRegistry<SettingInstance>> = Lazy::new(|| {
    VariantRegistry::new("setting_instance")
        .with_variant(BASE_INSTANCE, SettingInstance::Base)
        .with_variant(GROUP_COLLECTION_INSTANCE, SettingInstance::GroupSettingCollection)
        .with_variant(CHOICE_INSTANCE, SettingInstance::Choice)
        .with_variant(SIMPLE_INSTANCE, SettingInstance::Simple)
});

impl Discriminated for SettingInstance {
    fn registry() -> &'static VariantRegistry<Self> {
        &SETTING_INSTANCES
    }
}

/// One setting of a policy.
///
/// `setting_instance` is `None` when Graph returns an instance kind this
/// crate does not model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSetting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        default,
        deserialize_with = "decode::single",
        skip_serializing_if = "Option::is_none"
    )]
    pub setting_instance: Option<SettingInstance>,
}

/// Reference to the template a policy was created from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTemplateReference {
    #[serde(default)]
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_display_version: Option<String>,
}

/// A settings catalog policy.
///
/// `settings` is only populated by Graph when the request expands
/// `settings`, or when listing them via
/// [`list_configuration_policy_settings`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// e.g. `windows10`, `macOS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<String>,
    /// e.g. `mdm`, `mdm,microsoftSense`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technologies: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_scope_tag_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_reference: Option<PolicyTemplateReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings: Vec<ConfigurationSetting>,
}

/// Who a policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentTarget {
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl AssignmentTarget {
    /// Targets the members of an Entra ID group.
    pub fn group(group_id: &str) -> Self {
        AssignmentTarget {
            odata_type: "#microsoft.graph.groupAssignmentTarget".to_string(),
            group_id: Some(group_id.to_string()),
        }
    }

    /// Excludes the members of an Entra ID group.
    pub fn exclusion_group(group_id: &str) -> Self {
        AssignmentTarget {
            odata_type: "#microsoft.graph.exclusionGroupAssignmentTarget".to_string(),
            group_id: Some(group_id.to_string()),
        }
    }

    /// Targets every enrolled device.
    pub fn all_devices() -> Self {
        AssignmentTarget {
            odata_type: "#microsoft.graph.allDevicesAssignmentTarget".to_string(),
            group_id: None,
        }
    }
}

/// One assignment of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub target: AssignmentTarget,
}

impl PolicyAssignment {
    pub fn new(target: AssignmentTarget) -> Self {
        PolicyAssignment { id: None, target }
    }
}

#[derive(Serialize)]
struct AssignRequest<'a> {
    assignments: &'a [PolicyAssignment],
}

fn policy_path(id: &str) -> String {
    format!("{CONFIGURATION_POLICIES}/{id}")
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Lists policies, following next links unless `query` bounds the result.
pub async fn list_configuration_policies(
    client: &GraphClient,
    query: &Query,
) -> crate::error::Result<(Vec<ConfigurationPolicy>, StatusCode)> {
    let request = GraphRequest::beta(CONFIGURATION_POLICIES)
        .with_query(query)
        .expect(StatusCode::OK);
    client.list(&request).await
}

/// Retrieves one policy. Pass `$expand=settings` in `query` to include
/// its settings.
pub async fn get_configuration_policy(
    client: &GraphClient,
    id: &str,
    query: &Query,
) -> crate::error::Result<(ConfigurationPolicy, StatusCode)> {
    let request = GraphRequest::beta(policy_path(id))
        .with_query(query)
        .expect(StatusCode::OK);
    client.get(&request).await
}

/// Lists a policy's settings with their instance trees decoded.
pub async fn list_configuration_policy_settings(
    client: &GraphClient,
    id: &str,
) -> crate::error::Result<(Vec<ConfigurationSetting>, StatusCode)> {
    let request = GraphRequest::beta(format!("{}/settings", policy_path(id))).expect(StatusCode::OK);
    client.list(&request).await
}

/// Creates a policy.
///
/// The settings catalog sometimes answers 404 for definitions that were
/// just published, so creation retries on `NotFound`.
pub async fn create_configuration_policy(
    client: &GraphClient,
    policy: &ConfigurationPolicy,
) -> crate::error::Result<(ConfigurationPolicy, StatusCode)> {
    let request = GraphRequest::beta(CONFIGURATION_POLICIES)
        .expect(StatusCode::CREATED)
        .with_consistency(ConsistencyCheck::NotFound);
    client.post(&request, policy).await
}

/// Updates a policy's properties. Graph answers with 200 or 204
/// depending on the tenant ring; both are accepted.
pub async fn update_configuration_policy(
    client: &GraphClient,
    id: &str,
    policy: &ConfigurationPolicy,
) -> crate::error::Result<StatusCode> {
    let request = GraphRequest::beta(policy_path(id))
        .expect(StatusCode::OK)
        .expect(StatusCode::NO_CONTENT);
    client.send_empty(Method::PATCH, &request, Some(policy)).await
}

/// Deletes a policy.
pub async fn delete_configuration_policy(client: &GraphClient, id: &str) -> crate::error::Result<StatusCode> {
    let request = GraphRequest::beta(policy_path(id)).expect(StatusCode::NO_CONTENT);
    client.delete(&request).await
}

/// Replaces a policy's assignments.
///
/// A group created moments earlier may not have replicated to Intune yet;
/// Graph reports that as `ResourceDoesNotExist`, which is retried.
pub async fn assign_configuration_policy(
    client: &GraphClient,
    id: &str,
    assignments: &[PolicyAssignment],
) -> crate::error::Result<(Vec<PolicyAssignment>, StatusCode)> {
    let request = GraphRequest::beta(format!("{}/assign", policy_path(id)))
        .expect(StatusCode::OK)
        .with_consistency(ConsistencyCheck::ErrorCode("ResourceDoesNotExist"));
    let (list, status): (ODataList<PolicyAssignment>, StatusCode) =
        client.post(&request, &AssignRequest { assignments }).await?;
    Ok((list.value, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode_collection, decode_nested_children, decode_single};
    use serde_json::json;

    const FIREWALL: &str = "vendor_msft_firewall_mdmstore_domainprofile_enablefirewall";

    fn three_level_group() -> Value {
        json!({
            "@odata.type": GROUP_COLLECTION_INSTANCE,
            "settingDefinitionId": "user_vendor_msft_policy_config_group",
            "groupSettingCollectionValue": [{
                "children": [{
                    "@odata.type": CHOICE_INSTANCE,
                    "settingDefinitionId": FIREWALL,
                    "choiceSettingValue": {
                        "value": "vendor_msft_firewall_mdmstore_domainprofile_enablefirewall_true",
                        "children": [{
                            "@odata.type": SIMPLE_INSTANCE,
                            "settingDefinitionId": "vendor_msft_firewall_logfilepath",
                            "simpleSettingValue": {
                                "@odata.type": "#microsoft.graph.deviceManagementConfigurationStringSettingValue",
                                "value": "%systemroot%\\firewall.log"
                            }
                        }]
                    }
                }]
            }]
        })
    }

    #[test]
    fn nested_children_preserve_depth_and_values() {
        let decoded = decode_nested_children::<SettingInstance>(&[three_level_group()]).unwrap();
        assert_eq!(decoded.len(), 1);

        let group = &decoded[0];
        assert_eq!(group.depth(), 3);
        assert_eq!(group.setting_definition_id(), "user_vendor_msft_policy_config_group");

        let choice = group.children()[0];
        let SettingInstance::Choice(inner) = choice else {
            panic!("expected choice, got {choice:?}");
        };
        assert_eq!(inner.setting_definition_id, FIREWALL);
        let value = inner.choice_setting_value.as_ref().unwrap();
        assert_eq!(
            value.value.as_deref(),
            Some("vendor_msft_firewall_mdmstore_domainprofile_enablefirewall_true")
        );

        let SettingInstance::Simple(leaf) = &value.children[0] else {
            panic!("expected simple leaf");
        };
        let leaf_value = leaf.simple_setting_value.as_ref().unwrap();
        assert_eq!(leaf_value.value, Some(json!("%systemroot%\\firewall.log")));
        assert_eq!(
            leaf_value.odata_type.as_deref(),
            Some("#microsoft.graph.deviceManagementConfigurationStringSettingValue")
        );
    }

    #[test]
    fn instance_tree_round_trips_through_serde() {
        let decoded = decode_single(SettingInstance::registry(), &three_level_group())
            .unwrap()
            .unwrap();
        let reencoded = serde_json::to_value(&decoded).unwrap();
        let again = decode_single(SettingInstance::registry(), &reencoded)
            .unwrap()
            .unwrap();
        assert_eq!(again, decoded);
        assert_eq!(
            reencoded["groupSettingCollectionValue"][0]["children"][0]["@odata.type"],
            CHOICE_INSTANCE
        );
    }

    #[test]
    fn base_instance_round_trips_through_serde() {
        let base = SettingInstance::Base(BaseSettingInstance {
            setting_definition_id: "device_vendor_msft_policy_config_base".to_string(),
            setting_instance_template_reference: Some(SettingInstanceTemplateReference {
                setting_instance_template_id: "tmpl-1".to_string(),
            }),
        });
        let encoded = serde_json::to_value(&base).unwrap();
        assert_eq!(encoded["@odata.type"], BASE_INSTANCE);
        let decoded = decode_single(SettingInstance::registry(), &encoded)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, base);
        assert_eq!(decoded.depth(), 1);
    }

    #[test]
    fn unknown_child_kinds_are_dropped() {
        let raw = vec![json!({
            "@odata.type": CHOICE_INSTANCE,
            "settingDefinitionId": "parent",
            "choiceSettingValue": {
                "value": "parent_0",
                "children": [
                    {"@odata.type": "#microsoft.graph.deviceManagementConfigurationSettingGroupCollectionInstance", "settingDefinitionId": "future"},
                    {"@odata.type": BASE_INSTANCE, "settingDefinitionId": "kept"}
                ]
            }
        })];
        let decoded = decode_collection(SettingInstance::registry(), &raw).unwrap();
        let children = decoded[0].children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].setting_definition_id(), "kept");
        assert_eq!(decoded[0].depth(), 2);
    }

    #[test]
    fn malformed_grandchild_fails_the_tree() {
        let mut raw = three_level_group();
        raw["groupSettingCollectionValue"][0]["children"][0]["choiceSettingValue"]["children"][0]
            ["settingDefinitionId"] = json!(7);
        assert!(decode_collection(SettingInstance::registry(), &[raw]).is_err());
    }

    #[test]
    fn policy_decodes_expanded_settings() {
        let raw = json!({
            "id": "9a6e0a1e-0a8b-4a9b-bf46-2d3c3c6d0f45",
            "name": "Firewall baseline",
            "platforms": "windows10",
            "technologies": "mdm,microsoftSense",
            "roleScopeTagIds": ["0"],
            "settingCount": 2,
            "templateReference": {"templateId": "", "templateFamily": "none"},
            "settings": [
                {"id": "0", "settingInstance": three_level_group()},
                {"id": "1", "settingInstance": {"@odata.type": "#microsoft.graph.somethingNew", "settingDefinitionId": "x"}}
            ]
        });
        let policy: ConfigurationPolicy = serde_json::from_value(raw).unwrap();
        assert_eq!(policy.settings.len(), 2);
        assert_eq!(policy.settings[0].setting_instance.as_ref().map(SettingInstance::depth), Some(3));
        assert!(policy.settings[1].setting_instance.is_none());
        assert_eq!(policy.role_scope_tag_ids, vec!["0"]);
    }

    #[test]
    fn create_body_omits_server_fields() {
        let policy = ConfigurationPolicy {
            name: "Firewall baseline".to_string(),
            platforms: Some("windows10".to_string()),
            technologies: Some("mdm".to_string()),
            settings: vec![ConfigurationSetting {
                id: None,
                setting_instance: Some(SettingInstance::Simple(SimpleSettingInstance {
                    setting_definition_id: "vendor_msft_firewall_logfilepath".to_string(),
                    ..Default::default()
                })),
            }],
            ..Default::default()
        };
        let body = serde_json::to_value(&policy).unwrap();
        assert!(body.get("id").is_none());
        assert!(body.get("createdDateTime").is_none());
        assert_eq!(body["settings"][0]["settingInstance"]["@odata.type"], SIMPLE_INSTANCE);
    }

    #[test]
    fn assign_body_shape() {
        let assignments = [
            PolicyAssignment::new(AssignmentTarget::group("g1")),
            PolicyAssignment::new(AssignmentTarget::all_devices()),
        ];
        let body = serde_json::to_value(AssignRequest {
            assignments: &assignments,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"assignments": [
                {"target": {"@odata.type": "#microsoft.graph.groupAssignmentTarget", "groupId": "g1"}},
                {"target": {"@odata.type": "#microsoft.graph.allDevicesAssignmentTarget"}}
            ]})
        );
        assert_eq!(
            AssignmentTarget::exclusion_group("g2").odata_type,
            "#microsoft.graph.exclusionGroupAssignmentTarget"
        );
    }

    #[test]
    fn registry_holds_four_instance_kinds() {
        let registry = SettingInstance::registry();
        assert_eq!(registry.discriminators().count(), 4);
        for d in [BASE_INSTANCE, GROUP_COLLECTION_INSTANCE, CHOICE_INSTANCE, SIMPLE_INSTANCE] {
            assert!(registry.contains(d));
        }
    }
}
