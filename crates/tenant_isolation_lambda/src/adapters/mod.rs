//! Seams between the handlers and the services they call.
//!
//! Handlers only see these traits. `aws` implements them with the AWS SDK; the
//! `test_helpers` module implements them in memory.

pub mod aws;
pub mod cfn_response;

use std::fmt::Display;

use tenant_isolation_core::contract::{ObjectListing, PutObjectReceipt, TenantItem};
use tenant_isolation_core::session::{SessionRequest, TemporaryCredentials};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("{operation} failed{}: {message}", code_suffix(.code))]
    Sdk {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("STS returned no credentials for the assumed role")]
    MissingCredentials,

    #[error("malformed item: {0}")]
    MalformedItem(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl AdapterError {
    pub fn sdk(operation: &'static str, code: Option<&str>, message: impl Display) -> Self {
        Self::Sdk {
            operation,
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Sdk { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|code| format!(" ({code})"))
        .unwrap_or_default()
}

/// Exchanges the function's own identity for tag-scoped temporary credentials.
pub trait SessionBroker {
    fn assume_role(&self, request: &SessionRequest) -> Result<TemporaryCredentials, AdapterError>;
}

pub trait TenantTable {
    /// All items whose partition key equals `tenant_id`.
    fn query_partition(&self, table: &str, tenant_id: &str)
        -> Result<Vec<TenantItem>, AdapterError>;

    fn put_item(&self, table: &str, item: &TenantItem) -> Result<(), AdapterError>;
}

pub trait TenantObjects {
    fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<ObjectListing, AdapterError>;

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
    ) -> Result<PutObjectReceipt, AdapterError>;
}

/// Builds store clients that act with a given set of temporary credentials.
pub trait ScopedClients {
    fn table(&self, credentials: &TemporaryCredentials) -> Box<dyn TenantTable>;

    fn objects(&self, credentials: &TemporaryCredentials) -> Box<dyn TenantObjects>;
}
