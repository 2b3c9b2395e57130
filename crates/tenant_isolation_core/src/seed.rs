//! Fixture data written by the seed custom resource on stack creation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::contract::TenantItem;

pub const SEED_ITEMS: &[(&str, &str)] = &[
    ("alpha", "alpha1@alpha1.com"),
    ("alpha", "alpha2@alpha2.com"),
    ("beta", "beta1@beta1.com"),
    ("beta", "beta2@beta2.com"),
];

/// `(key, body)` pairs.
pub const SEED_OBJECTS: &[(&str, &str)] = &[
    ("alpha/fileName1.txt", "Test content 1"),
    ("alpha/fileName2.txt", "Test content 2"),
    ("beta/fileName3.txt", "Test content 3"),
    ("beta/fileName4.txt", "Test content 4"),
];

pub fn seed_items() -> Vec<TenantItem> {
    SEED_ITEMS
        .iter()
        .map(|(tenant_id, email)| TenantItem {
            tenant_id: tenant_id.to_string(),
            email: email.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// The fields of a CloudFormation custom resource event this stack uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceEvent {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl CustomResourceResponse {
    pub fn for_event(
        event: &CustomResourceEvent,
        status: ResponseStatus,
        reason: Option<String>,
        default_physical_id: &str,
    ) -> Self {
        Self {
            status,
            reason,
            physical_resource_id: event
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| default_physical_id.to_string()),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            data: Map::new(),
        }
    }

    /// `FAILED` answer for a payload that did not parse as an event, built
    /// from whatever identifiers it does carry. `None` when there is no
    /// `ResponseURL` to send it to.
    pub fn failed_for_raw_event(
        payload: &Value,
        reason: String,
        default_physical_id: &str,
    ) -> Option<(String, Self)> {
        let field = |name: &str| payload.get(name).and_then(Value::as_str);
        let response_url = field("ResponseURL")?.to_string();

        let response = Self {
            status: ResponseStatus::Failed,
            reason: Some(reason),
            physical_resource_id: field("PhysicalResourceId")
                .unwrap_or(default_physical_id)
                .to_string(),
            stack_id: field("StackId").unwrap_or_default().to_string(),
            request_id: field("RequestId").unwrap_or_default().to_string(),
            logical_resource_id: field("LogicalResourceId").unwrap_or_default().to_string(),
            data: Map::new(),
        };
        Some((response_url, response))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn seed_objects_stay_under_their_tenant_prefix() {
        let tenants: Vec<&str> = SEED_ITEMS.iter().map(|(tenant, _)| *tenant).collect();
        for (key, _) in SEED_OBJECTS {
            let (tenant, _) = key.split_once('/').expect("seed key has a prefix");
            assert!(tenants.contains(&tenant), "unknown tenant prefix in {key}");
        }
    }

    #[test]
    fn parses_cloudformation_event() {
        let event: CustomResourceEvent = serde_json::from_value(json!({
            "RequestType": "Create",
            "ResponseURL": "https://cloudformation-custom-resource-response.example/abc",
            "StackId": "arn:aws:cloudformation:eu-west-1:123456789012:stack/demo/1",
            "RequestId": "req-1",
            "LogicalResourceId": "TenantSeed",
            "ResourceType": "Custom::TenantSeed",
            "ResourceProperties": {"ServiceToken": "arn"}
        }))
        .expect("event should parse");

        assert_eq!(event.request_type, RequestType::Create);
        assert_eq!(event.physical_resource_id, None);
    }

    #[test]
    fn response_serializes_in_cloudformation_shape() {
        let event = CustomResourceEvent {
            request_type: RequestType::Delete,
            response_url: "https://example.invalid".to_string(),
            stack_id: "stack".to_string(),
            request_id: "req".to_string(),
            logical_resource_id: "TenantSeed".to_string(),
            physical_resource_id: Some("tenant-seed".to_string()),
        };

        let response =
            CustomResourceResponse::for_event(&event, ResponseStatus::Success, None, "unused");
        let value = serde_json::to_value(response).expect("response should serialize");

        assert_eq!(
            value,
            json!({
                "Status": "SUCCESS",
                "PhysicalResourceId": "tenant-seed",
                "StackId": "stack",
                "RequestId": "req",
                "LogicalResourceId": "TenantSeed"
            })
        );
    }

    #[test]
    fn unparsable_event_is_still_answered_with_failed() {
        let payload = json!({
            "RequestType": "Replace",
            "ResponseURL": "https://cloudformation-custom-resource-response.example/abc",
            "StackId": "stack",
            "RequestId": "req-2",
            "LogicalResourceId": "TenantSeed"
        });
        assert!(serde_json::from_value::<CustomResourceEvent>(payload.clone()).is_err());

        let (url, response) = CustomResourceResponse::failed_for_raw_event(
            &payload,
            "invalid custom resource event".to_string(),
            "tenant-seed-TestTable",
        )
        .expect("payload has a response url");

        assert_eq!(url, "https://cloudformation-custom-resource-response.example/abc");
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.physical_resource_id, "tenant-seed-TestTable");
        assert_eq!(response.request_id, "req-2");
        assert_eq!(response.logical_resource_id, "TenantSeed");
        assert_eq!(response.reason.as_deref(), Some("invalid custom resource event"));
    }

    #[test]
    fn payload_without_response_url_has_nowhere_to_report() {
        let payload = json!({"RequestType": "Create", "StackId": "stack"});
        assert!(
            CustomResourceResponse::failed_for_raw_event(&payload, "bad".to_string(), "id")
                .is_none()
        );
    }
}
