use std::collections::HashMap;
use std::future::Future;

use aws_config::SdkConfig;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_sts::types::Tag;
use tenant_isolation_core::contract::{
    ObjectListing, ObjectSummary, PutObjectReceipt, TenantItem, TABLE_PARTITION_KEY,
    TABLE_SORT_KEY,
};
use tenant_isolation_core::session::{SessionRequest, TemporaryCredentials};

use crate::adapters::{AdapterError, ScopedClients, SessionBroker, TenantObjects, TenantTable};

const SCOPED_CREDENTIALS_PROVIDER: &str = "TenantScopedSession";

/// Runs an SDK future from the synchronous adapter traits. Requires the
/// multi-threaded runtime the Lambda binaries start.
fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

pub async fn load_sdk_config() -> SdkConfig {
    aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await
}

pub struct StsSessionBroker {
    client: aws_sdk_sts::Client,
}

impl StsSessionBroker {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(config),
        }
    }
}

impl SessionBroker for StsSessionBroker {
    fn assume_role(&self, request: &SessionRequest) -> Result<TemporaryCredentials, AdapterError> {
        let mut assume_role = self
            .client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(request.duration_seconds);

        for tag in &request.tags {
            let tag = Tag::builder()
                .key(&tag.key)
                .value(&tag.value)
                .build()
                .map_err(|error| AdapterError::Request(error.to_string()))?;
            assume_role = assume_role.tags(tag);
        }

        let output = block_on(assume_role.send()).map_err(|error| {
            AdapterError::sdk("sts:AssumeRole", error.code(), DisplayErrorContext(&error))
        })?;
        let credentials = output
            .credentials()
            .ok_or(AdapterError::MissingCredentials)?;

        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration: Some(credentials.expiration().to_string()),
        })
    }
}

pub struct DynamoTenantTable {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoTenantTable {
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        Self { client }
    }
}

impl TenantTable for DynamoTenantTable {
    fn query_partition(
        &self,
        table: &str,
        tenant_id: &str,
    ) -> Result<Vec<TenantItem>, AdapterError> {
        collect_pages(|start_key| {
            let output = block_on(
                self.client
                    .query()
                    .table_name(table)
                    .key_condition_expression("#tenant = :tenant")
                    .expression_attribute_names("#tenant", TABLE_PARTITION_KEY)
                    .expression_attribute_values(
                        ":tenant",
                        AttributeValue::S(tenant_id.to_string()),
                    )
                    .set_exclusive_start_key(start_key)
                    .send(),
            )
            .map_err(|error| {
                AdapterError::sdk("dynamodb:Query", error.code(), DisplayErrorContext(&error))
            })?;

            let items = output
                .items()
                .iter()
                .map(item_from_attributes)
                .collect::<Result<Vec<_>, _>>()?;
            Ok((items, output.last_evaluated_key().cloned()))
        })
    }

    fn put_item(&self, table: &str, item: &TenantItem) -> Result<(), AdapterError> {
        block_on(
            self.client
                .put_item()
                .table_name(table)
                .item(TABLE_PARTITION_KEY, AttributeValue::S(item.tenant_id.clone()))
                .item(TABLE_SORT_KEY, AttributeValue::S(item.email.clone()))
                .send(),
        )
        .map(|_| ())
        .map_err(|error| {
            AdapterError::sdk("dynamodb:PutItem", error.code(), DisplayErrorContext(&error))
        })
    }
}

type StartKey = HashMap<String, AttributeValue>;

/// Drives a paginated read until the store stops returning a start key.
/// An empty key map ends the scan the same way a missing one does.
fn collect_pages<T>(
    mut fetch: impl FnMut(Option<StartKey>) -> Result<(Vec<T>, Option<StartKey>), AdapterError>,
) -> Result<Vec<T>, AdapterError> {
    let mut collected = Vec::new();
    let mut start_key = None;

    loop {
        let (page, next_key) = fetch(start_key.take())?;
        collected.extend(page);
        match next_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => return Ok(collected),
        }
    }
}

fn item_from_attributes(
    attributes: &HashMap<String, AttributeValue>,
) -> Result<TenantItem, AdapterError> {
    let string_attribute = |name: &str| {
        attributes
            .get(name)
            .and_then(|value| value.as_s().ok())
            .cloned()
            .ok_or_else(|| AdapterError::MalformedItem(format!("missing string attribute {name}")))
    };

    Ok(TenantItem {
        tenant_id: string_attribute(TABLE_PARTITION_KEY)?,
        email: string_attribute(TABLE_SORT_KEY)?,
    })
}

pub struct S3TenantObjects {
    client: aws_sdk_s3::Client,
}

impl S3TenantObjects {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

impl TenantObjects for S3TenantObjects {
    fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<ObjectListing, AdapterError> {
        let output = block_on(
            self.client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .send(),
        )
        .map_err(|error| {
            AdapterError::sdk("s3:ListObjectsV2", error.code(), DisplayErrorContext(&error))
        })?;

        let objects = output
            .contents()
            .iter()
            .map(|object| ObjectSummary {
                key: object.key().unwrap_or_default().to_string(),
                size: object.size().unwrap_or_default(),
                last_modified: object.last_modified().map(ToString::to_string),
            })
            .collect();

        Ok(ObjectListing {
            objects,
            is_truncated: output.is_truncated().unwrap_or(false),
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
    ) -> Result<PutObjectReceipt, AdapterError> {
        let output = block_on(
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type("text/plain; charset=utf-8")
                .body(ByteStream::from(body.to_vec()))
                .send(),
        )
        .map_err(|error| {
            AdapterError::sdk("s3:PutObject", error.code(), DisplayErrorContext(&error))
        })?;

        Ok(PutObjectReceipt {
            e_tag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }
}

/// Store clients built from the shared config with the session credentials
/// swapped in, so region and retry settings carry over.
pub struct AwsScopedClients {
    shared: SdkConfig,
}

impl AwsScopedClients {
    pub fn new(shared: SdkConfig) -> Self {
        Self { shared }
    }
}

impl ScopedClients for AwsScopedClients {
    fn table(&self, credentials: &TemporaryCredentials) -> Box<dyn TenantTable> {
        let config = aws_sdk_dynamodb::config::Builder::from(&self.shared)
            .credentials_provider(aws_sdk_dynamodb::config::Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                Some(credentials.session_token.clone()),
                None,
                SCOPED_CREDENTIALS_PROVIDER,
            ))
            .build();
        Box::new(DynamoTenantTable::new(aws_sdk_dynamodb::Client::from_conf(
            config,
        )))
    }

    fn objects(&self, credentials: &TemporaryCredentials) -> Box<dyn TenantObjects> {
        let config = aws_sdk_s3::config::Builder::from(&self.shared)
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                Some(credentials.session_token.clone()),
                None,
                SCOPED_CREDENTIALS_PROVIDER,
            ))
            .build();
        Box::new(S3TenantObjects::new(aws_sdk_s3::Client::from_conf(config)))
    }
}
