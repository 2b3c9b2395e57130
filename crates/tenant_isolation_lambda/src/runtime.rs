//! Lambda runtime wiring shared by the handler binaries.

use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use tenant_isolation_core::config::{HandlerConfig, SeedConfig};
use tenant_isolation_core::contract::{ApiGatewayResponse, HandlerKind};
use tenant_isolation_core::error::AccessError;
use tenant_isolation_core::seed::{CustomResourceEvent, CustomResourceResponse};
use tracing::{error, info, info_span};

use crate::adapters::aws::{
    load_sdk_config, AwsScopedClients, DynamoTenantTable, S3TenantObjects, StsSessionBroker,
};
use crate::adapters::cfn_response::send_custom_resource_response;
use crate::adapters::{ScopedClients, SessionBroker};
use crate::handlers::handle_request;
use crate::handlers::seed::{handle_seed_event, seed_physical_id};
use crate::telemetry::init_tracing;

struct RuntimeDependencies {
    kind: HandlerKind,
    config: Result<HandlerConfig, AccessError>,
    broker: StsSessionBroker,
    clients: AwsScopedClients,
}

/// Serves API Gateway events for one role-assuming handler.
///
/// A configuration error does not stop the function from starting; every
/// request is answered with a 500 instead.
pub async fn run_handler(kind: HandlerKind) -> Result<(), Error> {
    init_tracing();

    let config = HandlerConfig::from_env(kind).map_err(AccessError::from);
    match &config {
        Ok(config) => info!(
            handler = kind.binary_name(),
            role_configured = config.role_arn.is_some(),
            table = %config.table_name,
            bucket = %config.bucket_name,
            "handler configured"
        ),
        Err(error) => error!(handler = kind.binary_name(), error = %error, "invalid configuration"),
    }

    let sdk_config = load_sdk_config().await;
    let deps = Arc::new(RuntimeDependencies {
        kind,
        config,
        broker: StsSessionBroker::new(&sdk_config),
        clients: AwsScopedClients::new(sdk_config),
    });

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let deps = Arc::clone(&deps);
        async move {
            let span = info_span!(
                "request",
                handler = deps.kind.binary_name(),
                request_id = %event.context.request_id
            );
            let _entered = span.enter();
            Ok::<ApiGatewayResponse, Error>(dispatch(
                &deps.config,
                &event.payload,
                &deps.broker,
                &deps.clients,
            ))
        }
    }))
    .await
}

/// Answers one API Gateway event, or the configuration error if there is one.
pub fn dispatch(
    config: &Result<HandlerConfig, AccessError>,
    payload: &Value,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> ApiGatewayResponse {
    match config {
        Ok(config) => handle_request(payload, config, broker, clients),
        Err(error) => error.clone().into(),
    }
}

/// Serves the seed custom resource and reports each result to CloudFormation.
pub async fn run_seed() -> Result<(), Error> {
    init_tracing();

    let config = SeedConfig::from_env();
    let sdk_config = load_sdk_config().await;
    let table = DynamoTenantTable::new(aws_sdk_dynamodb::Client::new(&sdk_config));
    let objects = S3TenantObjects::new(aws_sdk_s3::Client::new(&sdk_config));
    let http = reqwest::Client::new();

    let handler = |event: LambdaEvent<Value>| {
        let config = &config;
        let table = &table;
        let objects = &objects;
        let http = &http;
        async move {
            let request_id = event.context.request_id.clone();
            let payload = event.payload;
            let event: CustomResourceEvent = match serde_json::from_value(payload.clone()) {
                Ok(event) => event,
                Err(parse_error) => {
                    let reason = format!("invalid custom resource event: {parse_error}");
                    error!(request_id = %request_id, error = %reason, "rejecting seed event");
                    if let Some((url, response)) = CustomResourceResponse::failed_for_raw_event(
                        &payload,
                        reason.clone(),
                        &seed_physical_id(config),
                    ) {
                        send_custom_resource_response(http, &url, &response)
                            .await
                            .map_err(|error| Error::from(error.to_string()))?;
                        info!(status = ?response.status, "custom resource response sent");
                    }
                    return Err(Error::from(reason));
                }
            };

            let response = {
                let span = info_span!(
                    "seed",
                    request_id = %request_id,
                    request_type = ?event.request_type
                );
                let _entered = span.enter();
                handle_seed_event(&event, config, table, objects)
            };

            send_custom_resource_response(http, &event.response_url, &response)
                .await
                .map_err(|error| Error::from(error.to_string()))?;
            info!(status = ?response.status, "custom resource response sent");
            Ok::<Value, Error>(json!({ "status": response.status }))
        }
    };

    lambda_runtime::run(service_fn(handler)).await
}

#[cfg(test)]
mod tests {
    use tenant_isolation_core::error::ConfigError;

    use super::*;
    use crate::test_helpers::{api_event, body_json, handler_config, TagScopedCloud, ROLE_ARN};

    #[test]
    fn misconfiguration_answers_every_request_with_500() {
        let cloud = TagScopedCloud::new();
        let config = Err(AccessError::from(ConfigError::NotAnInteger {
            key: "SESSION_DURATION_SECONDS",
            value: "soon".to_string(),
        }));

        let response = dispatch(&config, &api_event(&[("tenantId", "alpha")]), &cloud, &cloud);

        assert_eq!(response.status_code, 500);
        assert_eq!(body_json(&response)["error"]["code"], "misconfiguration");
        assert!(cloud.sessions().is_empty());
    }

    #[test]
    fn configured_handler_is_dispatched() {
        let cloud = TagScopedCloud::new();
        cloud.seed_fixtures("TestTable", "tenant-isolation-test-bucket-2023");
        let config = Ok(handler_config(HandlerKind::TableReader, Some(ROLE_ARN), &[]));

        let response = dispatch(&config, &api_event(&[("tenantId", "alpha")]), &cloud, &cloud);

        assert_eq!(response.status_code, 200);
        assert_eq!(body_json(&response)["count"], 2);
    }
}
