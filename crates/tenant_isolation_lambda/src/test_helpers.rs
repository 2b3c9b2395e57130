//! Test helpers for common test setup and utilities.
//!
//! [`TagScopedCloud`] stands in for STS, DynamoDB and S3 at once. Credentials
//! it issues remember the session tag they were minted with, and the scoped
//! clients refuse any partition or prefix that does not match that tag, the
//! way the IAM policies on the scoped roles do.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Map, Value};
use tenant_isolation_core::config::HandlerConfig;
use tenant_isolation_core::contract::{
    ApiGatewayResponse, HandlerKind, ObjectListing, ObjectSummary, PutObjectReceipt, TenantItem,
};
use tenant_isolation_core::seed::{seed_items, SEED_OBJECTS};
use tenant_isolation_core::session::{SessionRequest, TemporaryCredentials};

use crate::adapters::{AdapterError, ScopedClients, SessionBroker, TenantObjects, TenantTable};

/// Scoped role used by handler tests.
pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/tenant-isolation-ScopedRole";

/// Fixed timestamp reported for every stored object.
pub const OBJECT_LAST_MODIFIED: &str = "2023-06-01T00:00:00Z";

#[derive(Debug, Default)]
struct CloudState {
    tables: HashMap<String, BTreeMap<(String, String), TenantItem>>,
    buckets: HashMap<String, BTreeMap<String, Vec<u8>>>,
    sessions: Vec<SessionRequest>,
    denied_roles: HashSet<String>,
    /// Access key id -> session tag value.
    issued: HashMap<String, String>,
    write_failure: Option<String>,
}

/// In-memory STS, DynamoDB and S3 that enforce tag-scoped access.
#[derive(Debug, Clone, Default)]
pub struct TagScopedCloud {
    state: Arc<Mutex<CloudState>>,
}

impl TagScopedCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().expect("poisoned mutex")
    }

    /// Writes the stack's seed fixtures without going through any policy.
    pub fn seed_fixtures(&self, table: &str, bucket: &str) {
        let mut state = self.state();
        let items = state.tables.entry(table.to_string()).or_default();
        for item in seed_items() {
            items.insert((item.tenant_id.clone(), item.email.clone()), item);
        }
        let objects = state.buckets.entry(bucket.to_string()).or_default();
        for (key, body) in SEED_OBJECTS {
            objects.insert(key.to_string(), body.as_bytes().to_vec());
        }
    }

    /// Every AssumeRole request seen so far, in order.
    pub fn sessions(&self) -> Vec<SessionRequest> {
        self.state().sessions.clone()
    }

    /// Items of `table` ordered by partition then sort key.
    pub fn items(&self, table: &str) -> Vec<TenantItem> {
        self.state()
            .tables
            .get(table)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    /// Makes AssumeRole on `role_arn` fail as if the trust policy refused it.
    pub fn deny_role(&self, role_arn: &str) {
        self.state().denied_roles.insert(role_arn.to_string());
    }

    /// Makes every subsequent write fail with the given error code.
    pub fn fail_store_writes(&self, code: &str) {
        self.state().write_failure = Some(code.to_string());
    }

    /// Clients acting with the function's own identity, as the seed does.
    pub fn unscoped_table(&self) -> InMemoryTable {
        InMemoryTable {
            state: Arc::clone(&self.state),
            principal_tag: Principal::Unscoped,
        }
    }

    pub fn unscoped_objects(&self) -> InMemoryObjects {
        InMemoryObjects {
            state: Arc::clone(&self.state),
            principal_tag: Principal::Unscoped,
        }
    }

    fn principal(&self, credentials: &TemporaryCredentials) -> Principal {
        match self.state().issued.get(&credentials.access_key_id) {
            Some(tag) => Principal::Tagged(tag.clone()),
            None => Principal::Unknown,
        }
    }
}

impl SessionBroker for TagScopedCloud {
    fn assume_role(&self, request: &SessionRequest) -> Result<TemporaryCredentials, AdapterError> {
        let mut state = self.state();
        state.sessions.push(request.clone());
        if state.denied_roles.contains(&request.role_arn) {
            return Err(AdapterError::sdk(
                "AssumeRole",
                Some("AccessDenied"),
                format!("not authorized to perform: sts:AssumeRole on {}", request.role_arn),
            ));
        }

        let access_key_id = format!("ASIATEST{:04}", state.sessions.len());
        let tag = request
            .tags
            .first()
            .map(|tag| tag.value.clone())
            .unwrap_or_default();
        state.issued.insert(access_key_id.clone(), tag);

        Ok(TemporaryCredentials {
            access_key_id,
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: Some("2023-06-01T00:15:00Z".to_string()),
        })
    }
}

impl ScopedClients for TagScopedCloud {
    fn table(&self, credentials: &TemporaryCredentials) -> Box<dyn TenantTable> {
        Box::new(InMemoryTable {
            state: Arc::clone(&self.state),
            principal_tag: self.principal(credentials),
        })
    }

    fn objects(&self, credentials: &TemporaryCredentials) -> Box<dyn TenantObjects> {
        Box::new(InMemoryObjects {
            state: Arc::clone(&self.state),
            principal_tag: self.principal(credentials),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Principal {
    Unscoped,
    Tagged(String),
    Unknown,
}

impl Principal {
    fn allows(&self, predicate: impl FnOnce(&str) -> bool) -> bool {
        match self {
            Self::Unscoped => true,
            Self::Tagged(tag) => predicate(tag),
            Self::Unknown => false,
        }
    }
}

#[derive(Debug)]
pub struct InMemoryTable {
    state: Arc<Mutex<CloudState>>,
    principal_tag: Principal,
}

impl InMemoryTable {
    fn authorize(&self, action: &'static str, tenant_id: &str) -> Result<(), AdapterError> {
        if self.principal_tag.allows(|tag| tag == tenant_id) {
            return Ok(());
        }
        Err(AdapterError::sdk(
            action,
            Some("AccessDeniedException"),
            format!("not authorized to perform: dynamodb:{action} on partition {tenant_id}"),
        ))
    }
}

impl TenantTable for InMemoryTable {
    fn query_partition(
        &self,
        table: &str,
        tenant_id: &str,
    ) -> Result<Vec<TenantItem>, AdapterError> {
        self.authorize("Query", tenant_id)?;
        let state = self.state.lock().expect("poisoned mutex");
        Ok(state
            .tables
            .get(table)
            .map(|items| {
                items
                    .values()
                    .filter(|item| item.tenant_id == tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn put_item(&self, table: &str, item: &TenantItem) -> Result<(), AdapterError> {
        self.authorize("PutItem", &item.tenant_id)?;
        let mut state = self.state.lock().expect("poisoned mutex");
        if let Some(code) = &state.write_failure {
            return Err(AdapterError::sdk("PutItem", Some(code.as_str()), "injected failure"));
        }
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .insert((item.tenant_id.clone(), item.email.clone()), item.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryObjects {
    state: Arc<Mutex<CloudState>>,
    principal_tag: Principal,
}

impl InMemoryObjects {
    fn authorize(&self, action: &'static str, key_or_prefix: &str) -> Result<(), AdapterError> {
        if self
            .principal_tag
            .allows(|tag| key_or_prefix.starts_with(&format!("{tag}/")))
        {
            return Ok(());
        }
        Err(AdapterError::sdk(action, Some("AccessDenied"), "Access Denied"))
    }
}

impl TenantObjects for InMemoryObjects {
    fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<ObjectListing, AdapterError> {
        self.authorize("ListObjectsV2", prefix)?;
        let state = self.state.lock().expect("poisoned mutex");
        let objects = state
            .buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(key, _)| key.starts_with(prefix))
                    .map(|(key, body)| ObjectSummary {
                        key: key.clone(),
                        size: body.len() as i64,
                        last_modified: Some(OBJECT_LAST_MODIFIED.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ObjectListing {
            objects,
            is_truncated: false,
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
    ) -> Result<PutObjectReceipt, AdapterError> {
        self.authorize("PutObject", key)?;
        let mut state = self.state.lock().expect("poisoned mutex");
        if let Some(code) = &state.write_failure {
            return Err(AdapterError::sdk("PutObject", Some(code.as_str()), "injected failure"));
        }
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.to_vec());
        Ok(PutObjectReceipt {
            e_tag: Some(format!("\"{:08x}\"", body.len())),
            version_id: None,
        })
    }
}

/// An API Gateway proxy event carrying the given query string parameters.
pub fn api_event(params: &[(&str, &str)]) -> Value {
    let query: Map<String, Value> = params
        .iter()
        .map(|(name, value)| (name.to_string(), json!(value)))
        .collect();
    json!({
        "resource": "/",
        "httpMethod": "GET",
        "queryStringParameters": query,
        "requestContext": {"requestId": "test-request"},
    })
}

pub fn body_json(response: &ApiGatewayResponse) -> Value {
    serde_json::from_str(&response.body).expect("response body should be JSON")
}

/// Handler configuration as the stack would inject it, plus `overrides`.
pub fn handler_config(
    kind: HandlerKind,
    role_arn: Option<&str>,
    overrides: &[(&str, &str)],
) -> HandlerConfig {
    let mut env: HashMap<String, String> = overrides
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    if let Some(role_arn) = role_arn {
        env.insert(kind.role_arn_env_key().to_string(), role_arn.to_string());
    }
    HandlerConfig::from_lookup(kind, |key: &str| env.get(key).cloned())
        .expect("test handler config should be valid")
}
