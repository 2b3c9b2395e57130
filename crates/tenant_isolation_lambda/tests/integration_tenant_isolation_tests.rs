use serde_json::{json, Value};
use tenant_isolation_core::config::{HandlerConfig, SeedConfig};
use tenant_isolation_core::contract::{HandlerKind, BUCKET_NAME, TABLE_NAME};
use tenant_isolation_core::seed::{CustomResourceEvent, RequestType, ResponseStatus};
use tenant_isolation_lambda::handlers::handle_request;
use tenant_isolation_lambda::handlers::seed::handle_seed_event;
use tenant_isolation_lambda::test_helpers::{
    api_event, body_json, handler_config, TagScopedCloud, ROLE_ARN,
};

fn seeded_cloud() -> TagScopedCloud {
    let cloud = TagScopedCloud::new();
    let event = CustomResourceEvent {
        request_type: RequestType::Create,
        response_url: "https://cloudformation.example/response".to_string(),
        stack_id: "arn:aws:cloudformation:eu-west-1:123456789012:stack/tenant-isolation/1"
            .to_string(),
        request_id: "seed-1".to_string(),
        logical_resource_id: "TenantSeed".to_string(),
        physical_resource_id: None,
    };
    let config = SeedConfig::from_lookup(|_| None);
    let response = handle_seed_event(
        &event,
        &config,
        &cloud.unscoped_table(),
        &cloud.unscoped_objects(),
    );
    assert_eq!(response.status, ResponseStatus::Success);
    cloud
}

fn request_for(kind: HandlerKind, tenant_id: &str) -> Value {
    match kind {
        HandlerKind::TableReader | HandlerKind::BucketReader => {
            api_event(&[("tenantId", tenant_id)])
        }
        HandlerKind::TableWriter => {
            let email = format!("new@{tenant_id}.com");
            api_event(&[("tenantId", tenant_id), ("email", email.as_str())])
        }
        HandlerKind::BucketWriter => api_event(&[
            ("tenantId", tenant_id),
            ("fileName", "upload.txt"),
            ("text", "uploaded"),
        ]),
    }
}

fn status_for(cloud: &TagScopedCloud, config: &HandlerConfig, tenant_id: &str) -> u16 {
    handle_request(&request_for(config.kind, tenant_id), config, cloud, cloud).status_code
}

#[test]
fn fixed_tag_confines_every_handler_to_the_predefined_tenant() {
    let cloud = seeded_cloud();

    for kind in HandlerKind::ALL {
        let config = handler_config(kind, Some(ROLE_ARN), &[]);
        assert_eq!(status_for(&cloud, &config, "alpha"), 200, "{kind:?} alpha");
        assert_eq!(status_for(&cloud, &config, "beta"), 403, "{kind:?} beta");
    }

    assert!(cloud
        .sessions()
        .iter()
        .all(|session| session.tag("TenantId") == Some("alpha")));
    assert!(cloud.object(BUCKET_NAME, "beta/upload.txt").is_none());
    assert!(!cloud
        .items(TABLE_NAME)
        .iter()
        .any(|item| item.email == "new@beta.com"));
}

#[test]
fn request_tag_mode_serves_each_tenant_its_own_data() {
    let cloud = seeded_cloud();

    for kind in HandlerKind::ALL {
        let config = handler_config(kind, Some(ROLE_ARN), &[("SESSION_TAG_VALUE", "request")]);
        for tenant_id in ["alpha", "beta"] {
            assert_eq!(status_for(&cloud, &config, tenant_id), 200, "{kind:?} {tenant_id}");
        }
    }

    let reader = handler_config(
        HandlerKind::TableReader,
        Some(ROLE_ARN),
        &[("SESSION_TAG_VALUE", "request")],
    );
    let response = handle_request(&api_event(&[("tenantId", "beta")]), &reader, &cloud, &cloud);
    let emails: Vec<String> = body_json(&response)["items"]
        .as_array()
        .expect("items array")
        .iter()
        .map(|item| item["email"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        emails,
        vec!["beta1@beta1.com", "beta2@beta2.com", "new@beta.com"]
    );
}

#[test]
fn seeded_objects_are_listed_per_tenant() {
    let cloud = seeded_cloud();
    let config = handler_config(HandlerKind::BucketReader, Some(ROLE_ARN), &[]);

    let response = handle_request(&api_event(&[("tenantId", "alpha")]), &config, &cloud, &cloud);

    let body = body_json(&response);
    assert_eq!(body["bucket"], json!(BUCKET_NAME));
    assert_eq!(body["prefix"], json!("alpha/"));
    assert_eq!(body["is_truncated"], json!(false));
    assert_eq!(body["objects"][0]["key"], json!("alpha/fileName1.txt"));
    assert_eq!(body["objects"][0]["size"], json!("Test content 1".len()));
}

#[test]
fn session_settings_come_from_the_environment() {
    let cloud = seeded_cloud();
    let config = handler_config(
        HandlerKind::TableReader,
        Some(ROLE_ARN),
        &[
            ("SESSION_DURATION_SECONDS", "3600"),
            ("SESSION_TAG_VALUE", "beta"),
        ],
    );

    let response = handle_request(&api_event(&[("tenantId", "beta")]), &config, &cloud, &cloud);

    assert_eq!(response.status_code, 200);
    let sessions = cloud.sessions();
    let session = &sessions[0];
    assert_eq!(session.role_arn, ROLE_ARN);
    assert_eq!(session.duration_seconds, 3600);
    assert_eq!(session.session_name, HandlerKind::TableReader.session_name());
    assert_eq!(session.tag("TenantId"), Some("beta"));
}

#[test]
fn validation_failures_never_reach_sts() {
    let cloud = seeded_cloud();

    for kind in HandlerKind::ALL {
        let missing_role = handler_config(kind, None, &[]);
        let response = handle_request(&request_for(kind, "alpha"), &missing_role, &cloud, &cloud);
        assert_eq!(body_json(&response), json!({"message": "Access role not found"}));

        let configured = handler_config(kind, Some(ROLE_ARN), &[]);
        let response = handle_request(&api_event(&[]), &configured, &cloud, &cloud);
        assert_eq!(response.status_code, 403);
        assert_eq!(body_json(&response), json!({"message": "Tenant ID is required"}));
    }

    assert!(cloud.sessions().is_empty());
}
