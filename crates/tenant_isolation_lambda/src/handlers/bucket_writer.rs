use serde_json::Value;
use tenant_isolation_core::config::HandlerConfig;
use tenant_isolation_core::contract::{
    ApiGatewayResponse, BucketWriteResponse, QueryParams, FILE_NAME_PARAM, TEXT_PARAM,
};
use tenant_isolation_core::error::AccessError;
use tenant_isolation_core::storage_keys::tenant_object_key;

use super::{assume_scoped_role, respond, scoped_role, store_error, tenant_id};
use crate::adapters::{ScopedClients, SessionBroker};

/// `GET /s3/write?tenantId=&fileName=&text=`: writes `<tenantId>/<fileName>`.
pub fn handle_bucket_write(
    event: &Value,
    config: &HandlerConfig,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> ApiGatewayResponse {
    respond(
        config.kind,
        write_object(event, config, broker, clients).map(ApiGatewayResponse::ok),
    )
}

fn write_object(
    event: &Value,
    config: &HandlerConfig,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> Result<BucketWriteResponse, AccessError> {
    let role_arn = scoped_role(config)?;
    let params = QueryParams::from_event(event);
    let tenant_id = tenant_id(&params)?;
    let file_name = params.require(FILE_NAME_PARAM)?;
    let text = params.require(TEXT_PARAM)?;
    let key = tenant_object_key(&tenant_id, file_name).map_err(|reason| {
        AccessError::InvalidParameter {
            name: FILE_NAME_PARAM,
            reason,
        }
    })?;

    let credentials = assume_scoped_role(config, role_arn, &tenant_id, broker)?;
    let receipt = clients
        .objects(&credentials)
        .put_object(&config.bucket_name, &key, text.as_bytes())
        .map_err(store_error)?;

    Ok(BucketWriteResponse {
        bucket: config.bucket_name.clone(),
        key,
        receipt,
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
    fn writes_object_under_tenant_prefix() {
        let cloud = TagScopedCloud::new();
        let config = handler_config(HandlerKind::BucketWriter, Some(ROLE_ARN), &[]);

        let response = handle_bucket_write(
            &api_event(&[
                ("tenantId", "alpha"),
                ("fileName", "notes.txt"),
                ("text", "hello alpha"),
            ]),
            &config,
            &cloud,
            &cloud,
        );

        assert_eq!(response.status_code, 200);
        let body = body_json(&response);
        assert_eq!(body["key"], json!("alpha/notes.txt"));
        assert_eq!(body["bucket"], json!(BUCKET));
        assert_eq!(
            cloud.object(BUCKET, "alpha/notes.txt"),
            Some(b"hello alpha".to_vec())
        );
    }

    #[test]
    fn text_is_stored_byte_for_byte() {
        let cloud = TagScopedCloud::new();
        let config = handler_config(HandlerKind::BucketWriter, Some(ROLE_ARN), &[]);

        let response = handle_bucket_write(
            &api_event(&[
                ("tenantId", "alpha"),
                ("fileName", "padded.txt"),
                ("text", "  a\n"),
            ]),
            &config,
            &cloud,
            &cloud,
        );

        assert_eq!(response.status_code, 200);
        assert_eq!(
            cloud.object(BUCKET, "alpha/padded.txt"),
            Some(b"  a\n".to_vec())
        );
    }

    #[test]
    fn parameters_are_checked_in_order() {
        let cloud = TagScopedCloud::new();
        let config = handler_config(HandlerKind::BucketWriter, Some(ROLE_ARN), &[]);

        let missing_file = handle_bucket_write(
            &api_event(&[("tenantId", "alpha"), ("text", "x")]),
            &config,
            &cloud,
            &cloud,
        );
        assert_eq!(
            body_json(&missing_file),
            json!({"message": "File name is required"})
        );

        let missing_text = handle_bucket_write(
            &api_event(&[("tenantId", "alpha"), ("fileName", "a.txt")]),
            &config,
            &cloud,
            &cloud,
        );
        assert_eq!(body_json(&missing_text), json!({"message": "Text is required"}));
        assert!(cloud.sessions().is_empty());
    }

    #[test]
    fn relative_file_names_are_rejected() {
        let cloud = TagScopedCloud::new();
        let config = handler_config(HandlerKind::BucketWriter, Some(ROLE_ARN), &[]);

        let response = handle_bucket_write(
            &api_event(&[
                ("tenantId", "alpha"),
                ("fileName", "../beta/fileName3.txt"),
                ("text", "overwrite"),
            ]),
            &config,
            &cloud,
            &cloud,
        );

        assert_eq!(response.status_code, 403);
        assert!(cloud.object(BUCKET, "beta/fileName3.txt").is_none());
        assert!(cloud.sessions().is_empty());
    }
}
