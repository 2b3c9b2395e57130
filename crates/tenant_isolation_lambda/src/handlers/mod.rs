//! Straight-line request handlers.
//!
//! Each role-assuming handler checks its configuration and query parameters,
//! assumes the scoped role with the tenant session tag, and performs a single
//! store operation with the resulting credentials. None of them decide whether
//! the tenant may touch the data; a wrong tag is refused by IAM and surfaces
//! here as a store error.

pub mod bucket_reader;
pub mod bucket_writer;
pub mod seed;
pub mod table_reader;
pub mod table_writer;

use serde_json::Value;
use tenant_isolation_core::config::HandlerConfig;
use tenant_isolation_core::contract::{
    ApiGatewayResponse, HandlerKind, QueryParams, TENANT_ID_PARAM,
};
use tenant_isolation_core::error::AccessError;
use tenant_isolation_core::session::TemporaryCredentials;
use tenant_isolation_core::storage_keys::validate_tenant_id;
use tracing::{info, warn};

use crate::adapters::{AdapterError, ScopedClients, SessionBroker};

/// Routes an API Gateway event to the handler configured by `config.kind`.
pub fn handle_request(
    event: &Value,
    config: &HandlerConfig,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> ApiGatewayResponse {
    info!(
        handler = config.kind.binary_name(),
        resource = event.get("resource").and_then(serde_json::Value::as_str).unwrap_or_default(),
        query = %event.get("queryStringParameters").unwrap_or(&serde_json::Value::Null),
        "request received"
    );

    match config.kind {
        HandlerKind::TableReader => {
            table_reader::handle_table_read(event, config, broker, clients)
        }
        HandlerKind::TableWriter => {
            table_writer::handle_table_write(event, config, broker, clients)
        }
        HandlerKind::BucketReader => {
            bucket_reader::handle_bucket_read(event, config, broker, clients)
        }
        HandlerKind::BucketWriter => {
            bucket_writer::handle_bucket_write(event, config, broker, clients)
        }
    }
}

fn respond(
    kind: HandlerKind,
    result: Result<ApiGatewayResponse, AccessError>,
) -> ApiGatewayResponse {
    match result {
        Ok(response) => {
            info!(
                handler = kind.binary_name(),
                status = response.status_code,
                "request completed"
            );
            response
        }
        Err(error) => {
            warn!(
                handler = kind.binary_name(),
                status = error.status_code(),
                error = %error,
                "request refused"
            );
            error.into()
        }
    }
}

fn scoped_role(config: &HandlerConfig) -> Result<&str, AccessError> {
    config.role_arn.as_deref().ok_or(AccessError::MissingRole)
}

fn tenant_id(params: &QueryParams) -> Result<String, AccessError> {
    let tenant_id = params.require(TENANT_ID_PARAM)?;
    validate_tenant_id(tenant_id).map_err(|_| AccessError::InvalidTenant(tenant_id.to_string()))?;
    Ok(tenant_id.to_string())
}

fn assume_scoped_role(
    config: &HandlerConfig,
    role_arn: &str,
    tenant_id: &str,
    broker: &dyn SessionBroker,
) -> Result<TemporaryCredentials, AccessError> {
    let request = config.session_request(role_arn, tenant_id)?;
    info!(
        role_arn,
        session_name = %request.session_name,
        duration_seconds = request.duration_seconds,
        session_tag = request.tag(&config.session.tag_key).unwrap_or_default(),
        tenant_id,
        "assuming scoped role"
    );

    broker
        .assume_role(&request)
        .map_err(|error| AccessError::AssumeRole(error.to_string()))
}

fn store_error(error: AdapterError) -> AccessError {
    AccessError::Store(error.to_string())
}
