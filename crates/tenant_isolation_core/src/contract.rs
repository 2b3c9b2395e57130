use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AccessError;

pub const TABLE_NAME: &str = "TestTable";
pub const TABLE_PARTITION_KEY: &str = "TenantId";
pub const TABLE_SORT_KEY: &str = "Email";
pub const BUCKET_NAME: &str = "tenant-isolation-test-bucket-2023";

pub const SESSION_TAG_KEY: &str = "TenantId";
pub const SESSION_TAG_PREDEFINED_VALUE: &str = "alpha";
pub const SESSION_DURATION_SECONDS: i32 = 900;

pub const TENANT_ID_PARAM: &str = "tenantId";
pub const EMAIL_PARAM: &str = "email";
pub const FILE_NAME_PARAM: &str = "fileName";
pub const TEXT_PARAM: &str = "text";

/// The role-assuming request handlers deployed by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    TableReader,
    TableWriter,
    BucketReader,
    BucketWriter,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 4] = [
        Self::TableReader,
        Self::TableWriter,
        Self::BucketReader,
        Self::BucketWriter,
    ];

    /// Environment key the deployed function reads its scoped role ARN from.
    pub fn role_arn_env_key(self) -> &'static str {
        match self {
            Self::TableReader => "DYNAMODB_READER_ROLE_ARN",
            Self::TableWriter => "DYNAMODB_WRITER_ROLE_ARN",
            Self::BucketReader => "S3_BUCKET_READER_ROLE_ARN",
            Self::BucketWriter => "S3_BUCKET_WRITER_ROLE_ARN",
        }
    }

    pub fn session_name(self) -> &'static str {
        match self {
            Self::TableReader => "DynamodbReaderSession",
            Self::TableWriter => "DynamodbWriterSession",
            Self::BucketReader => "S3BucketReaderSession",
            Self::BucketWriter => "S3BucketWriterSession",
        }
    }

    pub fn function_name(self, stack_name: &str) -> String {
        let suffix = match self {
            Self::TableReader => "ReadDynamodbLambda",
            Self::TableWriter => "WriteDynamodbLambda",
            Self::BucketReader => "ReadS3BucketLambda",
            Self::BucketWriter => "WriteS3BucketLambda",
        };
        format!("{stack_name}{suffix}")
    }

    /// Name of the Lambda binary built for this handler.
    pub fn binary_name(self) -> &'static str {
        match self {
            Self::TableReader => "table_reader",
            Self::TableWriter => "table_writer",
            Self::BucketReader => "bucket_reader",
            Self::BucketWriter => "bucket_writer",
        }
    }

    /// API path segments, e.g. `["dynamodb", "read"]`.
    pub fn route(self) -> [&'static str; 2] {
        match self {
            Self::TableReader => ["dynamodb", "read"],
            Self::TableWriter => ["dynamodb", "write"],
            Self::BucketReader => ["s3", "read"],
            Self::BucketWriter => ["s3", "write"],
        }
    }

    pub fn query_params(self) -> &'static [&'static str] {
        match self {
            Self::TableReader | Self::BucketReader => &[TENANT_ID_PARAM],
            Self::TableWriter => &[TENANT_ID_PARAM, EMAIL_PARAM],
            Self::BucketWriter => &[TENANT_ID_PARAM, FILE_NAME_PARAM, TEXT_PARAM],
        }
    }

    /// Pascal-case prefix used for CloudFormation logical ids.
    pub fn logical_name(self) -> &'static str {
        match self {
            Self::TableReader => "TableReader",
            Self::TableWriter => "TableWriter",
            Self::BucketReader => "BucketReader",
            Self::BucketWriter => "BucketWriter",
        }
    }
}

pub fn table_name(stack_name: &str) -> String {
    format!("{stack_name}{TABLE_NAME}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl ApiGatewayResponse {
    pub fn ok(payload: impl Serialize) -> Self {
        match serde_json::to_string(&payload) {
            Ok(body) => Self::with_body(200, body),
            Err(error) => Self::with_body(
                500,
                json!({
                    "error": {
                        "code": "serialization_error",
                        "message": error.to_string(),
                    }
                })
                .to_string(),
            ),
        }
    }

    pub fn with_body(status_code: u16, body: String) -> Self {
        Self {
            status_code,
            headers: json!({"Content-Type": "application/json"}),
            body,
        }
    }
}

impl From<AccessError> for ApiGatewayResponse {
    fn from(error: AccessError) -> Self {
        let body = match error.code() {
            Some(code) => json!({
                "error": {
                    "code": code,
                    "message": error.to_string(),
                }
            }),
            None => json!({ "message": error.to_string() }),
        };
        Self::with_body(error.status_code(), body.to_string())
    }
}

/// Query parameters of an API Gateway proxy event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: serde_json::Map<String, Value>,
}

impl QueryParams {
    pub fn from_event(event: &Value) -> Self {
        let values = event
            .get("queryStringParameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self { values }
    }

    /// Returns the value as sent, treating blank strings as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn require(&self, name: &'static str) -> Result<&str, AccessError> {
        self.get(name).ok_or(AccessError::MissingParameter(name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantItem {
    pub tenant_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableReadResponse {
    pub tenant_id: String,
    pub count: usize,
    pub items: Vec<TenantItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableWriteResponse {
    pub tenant_id: String,
    pub email: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ObjectListing {
    pub objects: Vec<ObjectSummary>,
    pub is_truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketReadResponse {
    pub bucket: String,
    pub prefix: String,
    pub is_truncated: bool,
    pub objects: Vec<ObjectSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PutObjectReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketWriteResponse {
    pub bucket: String,
    pub key: String,
    #[serde(flatten)]
    pub receipt: PutObjectReceipt,
}
