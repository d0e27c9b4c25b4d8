//! Integration tests for the settings catalog family using wiremock.
//!
//! - GET    /beta/deviceManagement/configurationPolicies
//! - GET    /beta/deviceManagement/configurationPolicies/{id}
//! - GET    /beta/deviceManagement/configurationPolicies/{id}/settings
//! - POST   /beta/deviceManagement/configurationPolicies
//! - PATCH  /beta/deviceManagement/configurationPolicies/{id}
//! - DELETE /beta/deviceManagement/configurationPolicies/{id}
//! - POST   /beta/deviceManagement/configurationPolicies/{id}/assign

use std::time::Duration;

use msgraph_typed::auth::TokenProvider;
use msgraph_typed::client::GraphClient;
use msgraph_typed::configuration_policies::*;
use msgraph_typed::error::GraphError;
use msgraph_typed::odata::Query;
use msgraph_typed::retry::RetryConfig;
use reqwest::StatusCode;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POLICIES: &str = "beta/deviceManagement/configurationPolicies";

fn mock_client(server: &MockServer) -> GraphClient {
    let tp = TokenProvider::with_token("mock-token");
    GraphClient::with_base_url(tp, &format!("{}/", server.uri()))
        .unwrap()
        .with_retry(RetryConfig::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(20),
        ))
}

fn nested_setting() -> serde_json::Value {
    serde_json::json!({
        "id": "0",
        "settingInstance": {
            "@odata.type": "#microsoft.graph.deviceManagementConfigurationGroupSettingCollectionInstance",
            "settingDefinitionId": "device_vendor_msft_policy_config_defender_group",
            "groupSettingCollectionValue": [{
                "children": [{
                    "@odata.type": "#microsoft.graph.deviceManagementConfigurationChoiceSettingInstance",
                    "settingDefinitionId": "device_vendor_msft_policy_config_defender_allowrealtimemonitoring",
                    "choiceSettingValue": {
                        "value": "device_vendor_msft_policy_config_defender_allowrealtimemonitoring_1",
                        "children": [{
                            "@odata.type": "#microsoft.graph.deviceManagementConfigurationSimpleSettingInstance",
                            "settingDefinitionId": "device_vendor_msft_policy_config_defender_daystoretaincleanedmalware",
                            "simpleSettingValue": {
                                "@odata.type": "#microsoft.graph.deviceManagementConfigurationIntegerSettingValue",
                                "value": 30
                            }
                        }]
                    }
                }]
            }]
        }
    })
}

// ── reads ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_policies_passes_select() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("GET"))
        .and(path(POLICIES))
        .and(query_param("$select", "id,name"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                {"id": "p1", "name": "Defender baseline"},
                {"id": "p2", "name": "Firewall"}
            ]
        })))
        .mount(&server)
        .await;

    let query = Query {
        select: vec!["id".to_string(), "name".to_string()],
        ..Query::default()
    };
    let (policies, _) = list_configuration_policies(&client, &query).await.unwrap();
    assert_eq!(policies.len(), 2);
    assert_eq!(policies[1].name, "Firewall");
    assert!(policies[0].settings.is_empty());
}

#[tokio::test]
async fn get_policy_with_expanded_settings() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("GET"))
        .and(path(format!("{POLICIES}/p1")))
        .and(query_param("$expand", "settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "p1",
            "name": "Defender baseline",
            "platforms": "windows10",
            "technologies": "mdm",
            "settingCount": 1,
            "settings": [nested_setting()]
        })))
        .mount(&server)
        .await;

    let query = Query {
        expand: vec!["settings".to_string()],
        ..Query::default()
    };
    let (policy, _) = get_configuration_policy(&client, "p1", &query).await.unwrap();
    assert_eq!(policy.setting_count, Some(1));
    let instance = policy.settings[0].setting_instance.as_ref().unwrap();
    assert_eq!(instance.depth(), 3);
}

#[tokio::test]
async fn list_settings_decodes_three_levels() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("GET"))
        .and(path(format!("{POLICIES}/p1/settings")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [nested_setting()]
        })))
        .mount(&server)
        .await;

    let (settings, _) = list_configuration_policy_settings(&client, "p1").await.unwrap();
    let group = settings[0].setting_instance.as_ref().unwrap();
    let choice = group.children()[0];
    let leaf = choice.children()[0];
    assert_eq!(
        leaf.setting_definition_id(),
        "device_vendor_msft_policy_config_defender_daystoretaincleanedmalware"
    );
    match leaf {
        SettingInstance::Simple(simple) => {
            let value = simple.simple_setting_value.as_ref().unwrap();
            assert_eq!(value.value, Some(serde_json::json!(30)));
        }
        other => panic!("expected simple setting, got {other:?}"),
    }
}

// ── writes ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_retries_not_found_then_succeeds() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("POST"))
        .and(path(POLICIES))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"code": "NotFound", "message": "setting definition not found"}
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(POLICIES))
        .and(body_partial_json(serde_json::json!({
            "name": "Defender baseline",
            "platforms": "windows10"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "new-policy",
            "name": "Defender baseline",
            "platforms": "windows10"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let policy = ConfigurationPolicy {
        name: "Defender baseline".to_string(),
        platforms: Some("windows10".to_string()),
        technologies: Some("mdm".to_string()),
        ..Default::default()
    };
    let (created, status) = create_configuration_policy(&client, &policy).await.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.id.as_deref(), Some("new-policy"));
}

#[tokio::test]
async fn update_accepts_ok_and_delete_accepts_no_content() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("PATCH"))
        .and(path(format!("{POLICIES}/p1")))
        .and(body_partial_json(serde_json::json!({"description": "updated"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "p1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{POLICIES}/p1")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let update = ConfigurationPolicy {
        name: "Defender baseline".to_string(),
        description: Some("updated".to_string()),
        ..Default::default()
    };
    assert_eq!(
        update_configuration_policy(&client, "p1", &update).await.unwrap(),
        StatusCode::OK
    );
    assert_eq!(
        delete_configuration_policy(&client, "p1").await.unwrap(),
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn assign_retries_until_group_replicates() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("POST"))
        .and(path(format!("{POLICIES}/p1/assign")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"code": "ResourceDoesNotExist", "message": "group g1 not found"}
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{POLICIES}/p1/assign")))
        .and(body_partial_json(serde_json::json!({
            "assignments": [
                {"target": {"@odata.type": "#microsoft.graph.groupAssignmentTarget", "groupId": "g1"}}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                {"id": "p1_g1", "target": {"@odata.type": "#microsoft.graph.groupAssignmentTarget", "groupId": "g1"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let assignments = [PolicyAssignment::new(AssignmentTarget::group("g1"))];
    let (assigned, _) = assign_configuration_policy(&client, "p1", &assignments)
        .await
        .unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].id.as_deref(), Some("p1_g1"));
}

#[tokio::test]
async fn assign_does_not_retry_other_codes() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("POST"))
        .and(path(format!("{POLICIES}/p1/assign")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"code": "BadRequest", "message": "invalid target"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let assignments = [PolicyAssignment::new(AssignmentTarget::all_devices())];
    let err = assign_configuration_policy(&client, "p1", &assignments)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Api { .. }));
    assert_eq!(err.odata_code(), Some("BadRequest"));
}
