use serde_json::Value;
use tenant_isolation_core::config::HandlerConfig;
use tenant_isolation_core::contract::{ApiGatewayResponse, BucketReadResponse, QueryParams};
use tenant_isolation_core::error::AccessError;
use tenant_isolation_core::storage_keys::tenant_prefix;

use super::{assume_scoped_role, respond, scoped_role, store_error, tenant_id};
use crate::adapters::{ScopedClients, SessionBroker};

/// `GET /s3/read?tenantId=`: lists objects under the tenant's prefix.
pub fn handle_bucket_read(
    event: &Value,
    config: &HandlerConfig,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> ApiGatewayResponse {
    respond(
        config.kind,
        list_objects(event, config, broker, clients).map(ApiGatewayResponse::ok),
    )
}

fn list_objects(
    event: &Value,
    config: &HandlerConfig,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> Result<BucketReadResponse, AccessError> {
    let role_arn = scoped_role(config)?;
    let params = QueryParams::from_event(event);
    let tenant_id = tenant_id(&params)?;
    let prefix = tenant_prefix(&tenant_id);

    let credentials = assume_scoped_role(config, role_arn, &tenant_id, broker)?;
    let listing = clients
        .objects(&credentials)
        .list_prefix(&config.bucket_name, &prefix)
        .map_err(store_error)?;

    Ok(BucketReadResponse {
        bucket: config.bucket_name.clone(),
        prefix,
        is_truncated: listing.is_truncated,
        objects: listing.objects,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tenant_isolation_core::contract::HandlerKind;

    use super::*;
    use crate::test_helpers::{api_event, body_json, handler_config, TagScopedCloud, ROLE_ARN};

    const BUCKET: &str = "tenant-isolation-test-bucket-2023";

    #[test]
    fn lists_only_the_tenant_prefix() {
        let cloud = TagScopedCloud::new();
        cloud.seed_fixtures("TestTable", BUCKET);
        let config = handler_config(HandlerKind::BucketReader, Some(ROLE_ARN), &[]);

        let response =
            handle_bucket_read(&api_event(&[("tenantId", "alpha")]), &config, &cloud, &cloud);

        assert_eq!(response.status_code, 200);
        let body: BucketReadResponse =
            serde_json::from_str(&response.body).expect("body should parse");
        assert_eq!(body.prefix, "alpha/");
        let keys: Vec<&str> = body.objects.iter().map(|object| object.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha/fileName1.txt", "alpha/fileName2.txt"]);
    }

    #[test]
    fn request_tag_mode_lets_each_tenant_read_its_own_prefix() {
        let cloud = TagScopedCloud::new();
        cloud.seed_fixtures("TestTable", BUCKET);
        let config = handler_config(
            HandlerKind::BucketReader,
            Some(ROLE_ARN),
            &[("SESSION_TAG_VALUE", "request")],
        );

        let response =
            handle_bucket_read(&api_event(&[("tenantId", "beta")]), &config, &cloud, &cloud);

        assert_eq!(response.status_code, 200);
        assert_eq!(body_json(&response)["objects"].as_array().map(Vec::len), Some(2));
        assert_eq!(cloud.sessions()[0].tag("TenantId"), Some("beta"));
    }

    #[test]
    fn tenant_with_separator_is_rejected() {
        let cloud = TagScopedCloud::new();
        let config = handler_config(HandlerKind::BucketReader, Some(ROLE_ARN), &[]);

        let response = handle_bucket_read(
            &api_event(&[("tenantId", "alpha/../beta")]),
            &config,
            &cloud,
            &cloud,
        );

        assert_eq!(response.status_code, 403);
        assert_eq!(
            body_json(&response),
            json!({"message": "Tenant ID 'alpha/../beta' is not a valid tenant identifier"})
        );
        assert!(cloud.sessions().is_empty());
    }
}
