use serde_json::Value;
use tenant_isolation_core::config::HandlerConfig;
use tenant_isolation_core::contract::{ApiGatewayResponse, QueryParams, TableReadResponse};
use tenant_isolation_core::error::AccessError;

use super::{assume_scoped_role, respond, scoped_role, store_error, tenant_id};
use crate::adapters::{ScopedClients, SessionBroker};

/// `GET /dynamodb/read?tenantId=`: reads the tenant's partition of the table.
pub fn handle_table_read(
    event: &Value,
    config: &HandlerConfig,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> ApiGatewayResponse {
    respond(
        config.kind,
        read_table(event, config, broker, clients).map(ApiGatewayResponse::ok),
    )
}

fn read_table(
    event: &Value,
    config: &HandlerConfig,
    broker: &dyn SessionBroker,
    clients: &dyn ScopedClients,
) -> Result<TableReadResponse, AccessError> {
    let role_arn = scoped_role(config)?;
    let params = QueryParams::from_event(event);
    let tenant_id = tenant_id(&params)?;

    let credentials = assume_scoped_role(config, role_arn, &tenant_id, broker)?;
    let items = clients
        .table(&credentials)
        .query_partition(&config.table_name, &tenant_id)
        .map_err(store_error)?;

    Ok(TableReadResponse {
        tenant_id,
        count: items.len(),
        items,
    })
}
