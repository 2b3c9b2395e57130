use serde_json::Value;
use tenant_isolation_core::config::HandlerConfig;
use tenant_isolation_core::contract::{
    ApiGatewayResponse, QueryParams, TableWriteResponse, TenantItem, EMAIL_PARAM,
};
use tenant_isolation_core::error::AccessError;

use super::{assume_scoped_role, respond, scoped_role, store_error, tenant_id};
use crate::adapters::{ScopedClients, SessionBroker};

/// `GET /dynamodb/write?tenantId=&email=`: writes one item into the tenant's partition.
pub fn handle_table_write(
    event: &Value,
    config: &HandlerConfig,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> ApiGatewayResponse {
    respond(
        config.kind,
        write_item(event, config, broker, clients).map(ApiGatewayResponse::ok),
    )
}

fn write_item(
    event: &Value,
    config: &HandlerConfig,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> Result<TableWriteResponse, AccessError> {
    let role_arn = scoped_role(config)?;
    let params = QueryParams::from_event(event);
    let tenant_id = tenant_id(&params)?;
    let email = params.require(EMAIL_PARAM)?.to_string();

    let credentials = assume_scoped_role(config, role_arn, &tenant_id, broker)?;
    let item = TenantItem {
        tenant_id: tenant_id.clone(),
        email: email.clone(),
    };
    clients
        .table(&credentials)
        .put_item(&config.table_name, &item)
        .map_err(store_error)?;

    Ok(TableWriteResponse {
        tenant_id,
        email,
        status: "written".to_string(),
    })
}
