use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tenant_isolation_core::config::SeedConfig;
use tenant_isolation_core::seed::{
    seed_items, CustomResourceEvent, CustomResourceResponse, RequestType, ResponseStatus,
    SEED_OBJECTS,
};
use tracing::{info, warn};

use crate::adapters::{AdapterError, TenantObjects, TenantTable};

/// Handles the seed custom resource. Only `Create` writes anything. `Update`
/// and `Delete` leave the fixtures alone; the bucket is retained when the
/// stack is deleted and its objects must be cleaned up by hand.
pub fn handle_seed_event(
    event: &CustomResourceEvent,
    config: &SeedConfig,
    table: &dyn TenantTable,
    objects: &dyn TenantObjects,
) -> CustomResourceResponse {
    let physical_id = seed_physical_id(config);

    match event.request_type {
        RequestType::Create => match write_fixtures(config, table, objects) {
            Ok(data) => {
                info!(
                    table = %config.table_name,
                    bucket = %config.bucket_name,
                    "seed fixtures written"
                );
                let mut response = CustomResourceResponse::for_event(
                    event,
                    ResponseStatus::Success,
                    None,
                    &physical_id,
                );
                response.data = data;
                response
            }
            Err(error) => {
                warn!(error = %error, "seeding failed");
                CustomResourceResponse::for_event(
                    event,
                    ResponseStatus::Failed,
                    Some(error.to_string()),
                    &physical_id,
                )
            }
        },
        RequestType::Update | RequestType::Delete => {
            info!(request_type = ?event.request_type, "nothing to seed");
            CustomResourceResponse::for_event(event, ResponseStatus::Success, None, &physical_id)
        }
    }
}

/// Physical id reported for a seed resource that has none yet.
pub fn seed_physical_id(config: &SeedConfig) -> String {
    format!("tenant-seed-{}", config.table_name)
}

fn write_fixtures(
    config: &SeedConfig,
    table: &dyn TenantTable,
    objects: &dyn TenantObjects,
) -> Result<Map<String, Value>, AdapterError> {
    let items = seed_items();
    for item in &items {
        table.put_item(&config.table_name, item)?;
    }
    for (key, body) in SEED_OBJECTS {
        objects.put_object(&config.bucket_name, key, body.as_bytes())?;
    }

    let mut data = Map::new();
    data.insert("ItemsWritten".to_string(), json!(items.len()));
    data.insert("ObjectsWritten".to_string(), json!(SEED_OBJECTS.len()));
    data.insert(
        "SeededAt".to_string(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    Ok(data)
}
