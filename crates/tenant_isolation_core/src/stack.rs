//! Declarative resource graph of the tenant isolation deployment.
//!
//! `synthesize` assembles the table, bucket, roles, functions and API routes
//! into a CloudFormation template. Maps are ordered so the same props always
//! produce byte-identical output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::{
    BUCKET_NAME_ENV, SESSION_TAG_KEY_ENV, SESSION_TAG_VALUE_ENV, TABLE_NAME_ENV,
};
use crate::contract::{
    table_name, HandlerKind, BUCKET_NAME, SESSION_TAG_KEY, TABLE_PARTITION_KEY, TABLE_SORT_KEY,
};
use crate::policy::{
    assume_scoped_role_policy, bucket_read_policy, bucket_write_policy, object_arn,
    service_trust_policy, session_tag_trust_policy, table_read_policy, table_write_policy,
    PolicyDocument, Statement,
};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const LAMBDA_RUNTIME: &str = "provided.al2023";
pub const STAGE_NAME: &str = "prod";
pub const SEED_BINARY_NAME: &str = "seed";

const TABLE_ID: &str = "Table";
const BUCKET_ID: &str = "Bucket";
const API_ID: &str = "Api";
const SEED_ROLE_ID: &str = "SeedExecutionRole";
const SEED_FUNCTION_ID: &str = "SeedFunction";
const SEED_RESOURCE_ID: &str = "TenantSeed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackProps {
    pub stack_name: String,
    pub bucket_name: String,
    /// Bucket holding the packaged `<binary>.zip` Lambda artifacts.
    pub artifact_bucket: String,
    pub artifact_prefix: String,
    pub session_tag_key: String,
    /// Forwarded as `SESSION_TAG_VALUE`; `None` keeps the handler default.
    pub session_tag_value: Option<String>,
    pub architecture: String,
    pub function_timeout_seconds: u32,
}

impl StackProps {
    pub fn new(stack_name: impl Into<String>, artifact_bucket: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            bucket_name: BUCKET_NAME.to_string(),
            artifact_bucket: artifact_bucket.into(),
            artifact_prefix: "tenant-isolation/lambda".to_string(),
            session_tag_key: SESSION_TAG_KEY.to_string(),
            session_tag_value: None,
            architecture: "x86_64".to_string(),
            function_timeout_seconds: 10,
        }
    }

    fn artifact_key(&self, binary_name: &str) -> String {
        format!(
            "{}/{binary_name}.zip",
            self.artifact_prefix.trim_matches('/')
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(
        rename = "DependsOn",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub depends_on: Vec<String>,
    #[serde(
        rename = "DeletionPolicy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deletion_policy: Option<String>,
    #[serde(
        rename = "UpdateReplacePolicy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub update_replace_policy: Option<String>,
}

impl Resource {
    pub fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    /// Keeps the physical resource when it is removed from the stack or replaced.
    pub fn retain(mut self) -> Self {
        self.deletion_policy = Some("Retain".to_string());
        self.update_replace_policy = Some("Retain".to_string());
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.depends_on.extend(ids);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub description: String,
    pub value: Value,
    pub export: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    pub resources: BTreeMap<String, Resource>,
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn ids_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
            .map(|(id, _)| id.as_str())
    }
}

pub fn ref_(id: &str) -> Value {
    json!({ "Ref": id })
}

pub fn get_att(id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id, attribute] })
}

fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

pub fn execution_role_id(kind: HandlerKind) -> String {
    format!("{}ExecutionRole", kind.logical_name())
}

pub fn scoped_role_id(kind: HandlerKind) -> String {
    format!("{}ScopedRole", kind.logical_name())
}

pub fn assume_policy_id(kind: HandlerKind) -> String {
    format!("{}AssumeScopedRolePolicy", kind.logical_name())
}

pub fn function_id(kind: HandlerKind) -> String {
    format!("{}Function", kind.logical_name())
}

pub fn method_id(kind: HandlerKind) -> String {
    format!("{}Method", kind.logical_name())
}

pub fn permission_id(kind: HandlerKind) -> String {
    format!("{}InvokePermission", kind.logical_name())
}

fn api_resource_id(segments: &[&str]) -> String {
    let mut id = API_ID.to_string();
    for segment in segments {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            id.extend(first.to_uppercase());
            id.push_str(chars.as_str());
        }
    }
    id.push_str("Resource");
    id
}

/// The tenant-scoped policy attached to the role a handler assumes.
pub fn scoped_policy(kind: HandlerKind, tag_key: &str) -> PolicyDocument {
    let table_arn = get_att(TABLE_ID, "Arn");
    let bucket_arn = get_att(BUCKET_ID, "Arn");
    match kind {
        HandlerKind::TableReader => table_read_policy(table_arn, tag_key),
        HandlerKind::TableWriter => table_write_policy(table_arn, tag_key),
        HandlerKind::BucketReader => bucket_read_policy(bucket_arn, tag_key),
        HandlerKind::BucketWriter => bucket_write_policy(bucket_arn, tag_key),
    }
}

pub fn synthesize(props: &StackProps) -> Template {
    let mut resources = BTreeMap::new();

    resources.insert(TABLE_ID.to_string(), table_resource(props));
    resources.insert(BUCKET_ID.to_string(), bucket_resource(props));

    for kind in HandlerKind::ALL {
        add_role_assuming_function(&mut resources, props, kind);
    }

    add_api(&mut resources, props);
    add_seed(&mut resources, props);

    Template {
        format_version: TEMPLATE_FORMAT_VERSION.to_string(),
        description: "Tenant isolation with tag-scoped role assumption".to_string(),
        resources,
        outputs: outputs(),
    }
}

fn table_resource(props: &StackProps) -> Resource {
    Resource::new(
        "AWS::DynamoDB::Table",
        json!({
            "TableName": table_name(&props.stack_name),
            "BillingMode": "PAY_PER_REQUEST",
            "AttributeDefinitions": [
                { "AttributeName": TABLE_PARTITION_KEY, "AttributeType": "S" },
                { "AttributeName": TABLE_SORT_KEY, "AttributeType": "S" },
            ],
            "KeySchema": [
                { "AttributeName": TABLE_PARTITION_KEY, "KeyType": "HASH" },
                { "AttributeName": TABLE_SORT_KEY, "KeyType": "RANGE" },
            ],
        }),
    )
}

/// The seed leaves objects behind and CloudFormation cannot delete a
/// non-empty bucket, so the bucket outlives the stack.
fn bucket_resource(props: &StackProps) -> Resource {
    Resource::new(
        "AWS::S3::Bucket",
        json!({
            "BucketName": props.bucket_name,
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
        }),
    )
    .retain()
}

fn basic_execution_role(policies: Vec<Value>) -> Resource {
    let mut properties = json!({
        "AssumeRolePolicyDocument": service_trust_policy("lambda.amazonaws.com").to_value(),
        "ManagedPolicyArns": [
            sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"),
        ],
    });
    if !policies.is_empty() {
        properties["Policies"] = Value::Array(policies);
    }
    Resource::new("AWS::IAM::Role", properties)
}

fn function_resource(
    props: &StackProps,
    function_name: String,
    binary_name: &str,
    role_id: &str,
    variables: Value,
) -> Resource {
    Resource::new(
        "AWS::Lambda::Function",
        json!({
            "FunctionName": function_name,
            "Runtime": LAMBDA_RUNTIME,
            "Handler": "bootstrap",
            "Architectures": [props.architecture],
            "Timeout": props.function_timeout_seconds,
            "Role": get_att(role_id, "Arn"),
            "Code": {
                "S3Bucket": props.artifact_bucket,
                "S3Key": props.artifact_key(binary_name),
            },
            "Environment": { "Variables": variables },
        }),
    )
}

/// Execution role, scoped role, assume-role grant and function for `kind`.
///
/// The scoped role trusts the execution role and the grant is a separate
/// policy resource, so neither role references the other's ARN in both
/// directions.
fn add_role_assuming_function(
    resources: &mut BTreeMap<String, Resource>,
    props: &StackProps,
    kind: HandlerKind,
) {
    let execution_role = execution_role_id(kind);
    let scoped_role = scoped_role_id(kind);
    let assume_policy = assume_policy_id(kind);

    resources.insert(execution_role.clone(), basic_execution_role(Vec::new()));

    resources.insert(
        scoped_role.clone(),
        Resource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": session_tag_trust_policy(
                    get_att(&execution_role, "Arn"),
                    &props.session_tag_key,
                )
                .to_value(),
                "Policies": [{
                    "PolicyName": "TenantScopedAccess",
                    "PolicyDocument": scoped_policy(kind, &props.session_tag_key).to_value(),
                }],
            }),
        ),
    );

    resources.insert(
        assume_policy.clone(),
        Resource::new(
            "AWS::IAM::Policy",
            json!({
                "PolicyName": format!("{}AssumeScopedRole", kind.logical_name()),
                "PolicyDocument": assume_scoped_role_policy(get_att(&scoped_role, "Arn")).to_value(),
                "Roles": [ref_(&execution_role)],
            }),
        ),
    );

    let mut variables = json!({
        kind.role_arn_env_key(): get_att(&scoped_role, "Arn"),
        TABLE_NAME_ENV: ref_(TABLE_ID),
        BUCKET_NAME_ENV: ref_(BUCKET_ID),
        SESSION_TAG_KEY_ENV: props.session_tag_key,
    });
    if let Some(value) = &props.session_tag_value {
        variables[SESSION_TAG_VALUE_ENV] = Value::String(value.clone());
    }

    resources.insert(
        function_id(kind),
        function_resource(
            props,
            kind.function_name(&props.stack_name),
            kind.binary_name(),
            &execution_role,
            variables,
        )
        .depends_on([assume_policy]),
    );
}

fn add_api(resources: &mut BTreeMap<String, Resource>, props: &StackProps) {
    resources.insert(
        API_ID.to_string(),
        Resource::new(
            "AWS::ApiGateway::RestApi",
            json!({ "Name": format!("{}API", props.stack_name) }),
        ),
    );

    let mut methods = BTreeMap::new();
    for kind in HandlerKind::ALL {
        let [group, action] = kind.route();
        let group_id = api_resource_id(&[group]);
        let route_id = api_resource_id(&[group, action]);

        resources.entry(group_id.clone()).or_insert_with(|| {
            Resource::new(
                "AWS::ApiGateway::Resource",
                json!({
                    "RestApiId": ref_(API_ID),
                    "ParentId": get_att(API_ID, "RootResourceId"),
                    "PathPart": group,
                }),
            )
        });
        resources.insert(
            route_id.clone(),
            Resource::new(
                "AWS::ApiGateway::Resource",
                json!({
                    "RestApiId": ref_(API_ID),
                    "ParentId": ref_(&group_id),
                    "PathPart": action,
                }),
            ),
        );

        let function = function_id(kind);
        methods.insert(
            method_id(kind),
            Resource::new(
                "AWS::ApiGateway::Method",
                json!({
                    "RestApiId": ref_(API_ID),
                    "ResourceId": ref_(&route_id),
                    "HttpMethod": "GET",
                    "AuthorizationType": "NONE",
                    "Integration": {
                        "Type": "AWS_PROXY",
                        "IntegrationHttpMethod": "POST",
                        "Uri": sub(&format!(
                            "arn:${{AWS::Partition}}:apigateway:${{AWS::Region}}:lambda:path/2015-03-31/functions/${{{function}.Arn}}/invocations"
                        )),
                    },
                }),
            ),
        );

        resources.insert(
            permission_id(kind),
            Resource::new(
                "AWS::Lambda::Permission",
                json!({
                    "Action": "lambda:InvokeFunction",
                    "FunctionName": get_att(&function, "Arn"),
                    "Principal": "apigateway.amazonaws.com",
                    "SourceArn": sub(&format!(
                        "arn:${{AWS::Partition}}:execute-api:${{AWS::Region}}:${{AWS::AccountId}}:${{{API_ID}}}/*/GET/{group}/{action}"
                    )),
                }),
            ),
        );
    }

    // A new deployment id whenever the routes change, otherwise the stage
    // keeps serving the previous snapshot.
    let deployment_id = format!("ApiDeployment{}", methods_fingerprint(&methods));
    let method_ids: Vec<String> = methods.keys().cloned().collect();
    resources.extend(methods);

    resources.insert(
        deployment_id.clone(),
        Resource::new(
            "AWS::ApiGateway::Deployment",
            json!({ "RestApiId": ref_(API_ID) }),
        )
        .depends_on(method_ids),
    );
    resources.insert(
        "ApiStage".to_string(),
        Resource::new(
            "AWS::ApiGateway::Stage",
            json!({
                "RestApiId": ref_(API_ID),
                "DeploymentId": ref_(&deployment_id),
                "StageName": STAGE_NAME,
            }),
        ),
    );
}

fn methods_fingerprint(methods: &BTreeMap<String, Resource>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(methods).unwrap_or_default());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

fn add_seed(resources: &mut BTreeMap<String, Resource>, props: &StackProps) {
    let seed_policy = PolicyDocument::new(vec![
        Statement::allow(&["dynamodb:PutItem"]).with_resources(vec![get_att(TABLE_ID, "Arn")]),
        Statement::allow(&["s3:PutObject"])
            .with_resources(vec![object_arn(get_att(BUCKET_ID, "Arn"), "*")]),
    ]);
    resources.insert(
        SEED_ROLE_ID.to_string(),
        basic_execution_role(vec![json!({
            "PolicyName": "SeedFixtures",
            "PolicyDocument": seed_policy.to_value(),
        })]),
    );

    resources.insert(
        SEED_FUNCTION_ID.to_string(),
        function_resource(
            props,
            format!("{}SeedTenantDataLambda", props.stack_name),
            SEED_BINARY_NAME,
            SEED_ROLE_ID,
            json!({
                TABLE_NAME_ENV: ref_(TABLE_ID),
                BUCKET_NAME_ENV: ref_(BUCKET_ID),
            }),
        ),
    );

    resources.insert(
        SEED_RESOURCE_ID.to_string(),
        Resource::new(
            "Custom::TenantSeed",
            json!({ "ServiceToken": get_att(SEED_FUNCTION_ID, "Arn") }),
        )
        .depends_on([TABLE_ID.to_string(), BUCKET_ID.to_string()]),
    );
}

fn outputs() -> BTreeMap<String, Output> {
    let mut outputs = BTreeMap::new();
    let export = |name: &str| json!({ "Name": sub(&format!("${{AWS::StackName}}-{name}")) });

    outputs.insert(
        "ApiUrl".to_string(),
        Output {
            description: "Base URL of the tenant API stage".to_string(),
            value: sub(&format!(
                "https://${{{API_ID}}}.execute-api.${{AWS::Region}}.${{AWS::URLSuffix}}/{STAGE_NAME}/"
            )),
            export: export("ApiUrl"),
        },
    );
    outputs.insert(
        "TableName".to_string(),
        Output {
            description: "Tenant-partitioned table".to_string(),
            value: ref_(TABLE_ID),
            export: export("TableName"),
        },
    );
    for kind in HandlerKind::ALL {
        let id = scoped_role_id(kind);
        outputs.insert(
            format!("{id}Arn"),
            Output {
                description: format!("Role assumed by the {} handler", kind.binary_name()),
                value: get_att(&id, "Arn"),
                export: export(&format!("{id}Arn")),
            },
        );
    }
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> StackProps {
        StackProps::new("Demo", "artifact-bucket")
    }

    #[test]
    fn synthesizes_core_resources() {
        let template = synthesize(&props());

        let table = template.resource(TABLE_ID).expect("table resource");
        assert_eq!(table.resource_type, "AWS::DynamoDB::Table");
        assert_eq!(table.properties["TableName"], json!("DemoTestTable"));
        assert_eq!(
            table.properties["KeySchema"][0],
            json!({"AttributeName": "TenantId", "KeyType": "HASH"})
        );

        assert_eq!(template.ids_of_type("AWS::Lambda::Function").count(), 5);
        assert_eq!(template.ids_of_type("AWS::ApiGateway::Method").count(), 4);
        assert_eq!(template.ids_of_type("AWS::Lambda::Permission").count(), 4);
        assert_eq!(template.ids_of_type("AWS::ApiGateway::Deployment").count(), 1);
    }

    #[test]
    fn every_scoped_policy_references_the_session_tag() {
        let template = synthesize(&props());

        for kind in HandlerKind::ALL {
            let role = template
                .resource(&scoped_role_id(kind))
                .expect("scoped role resource");
            let policy = role.properties["Policies"][0]["PolicyDocument"].to_string();
            assert!(
                policy.contains("${aws:PrincipalTag/TenantId}"),
                "{kind:?} policy is not tag-scoped: {policy}"
            );

            let trust = &role.properties["AssumeRolePolicyDocument"]["Statement"];
            assert_eq!(
                trust[0]["Principal"]["AWS"],
                get_att(&execution_role_id(kind), "Arn")
            );
        }
    }

    #[test]
    fn functions_receive_their_scoped_role_arn() {
        let template = synthesize(&props());

        for kind in HandlerKind::ALL {
            let function = template.resource(&function_id(kind)).expect("function");
            let variables = &function.properties["Environment"]["Variables"];
            assert_eq!(
                variables[kind.role_arn_env_key()],
                get_att(&scoped_role_id(kind), "Arn")
            );
            assert_eq!(function.depends_on, vec![assume_policy_id(kind)]);
            assert_eq!(
                function.properties["Code"]["S3Key"],
                json!(format!("tenant-isolation/lambda/{}.zip", kind.binary_name()))
            );
        }
    }

    #[test]
    fn session_tag_value_is_forwarded_when_set() {
        let mut props = props();
        props.session_tag_value = Some("request".to_string());
        let template = synthesize(&props);

        let function = template
            .resource(&function_id(HandlerKind::TableReader))
            .expect("function");
        assert_eq!(
            function.properties["Environment"]["Variables"]["SESSION_TAG_VALUE"],
            json!("request")
        );
    }

    #[test]
    fn api_routes_share_group_resources() {
        let template = synthesize(&props());

        let group = template.resource("ApiDynamodbResource").expect("group resource");
        assert_eq!(group.properties["PathPart"], json!("dynamodb"));
        let route = template.resource("ApiS3WriteResource").expect("route resource");
        assert_eq!(route.properties["ParentId"], ref_("ApiS3Resource"));
    }

    #[test]
    fn synthesis_is_deterministic() {
        let first = synthesize(&props()).to_json_pretty().expect("template serializes");
        let second = synthesize(&props()).to_json_pretty().expect("template serializes");
        assert_eq!(first, second);
    }

    #[test]
    fn seeded_bucket_is_retained_on_delete() {
        let template = synthesize(&props());
        let bucket = template.resource(BUCKET_ID).expect("bucket");

        assert_eq!(bucket.deletion_policy.as_deref(), Some("Retain"));
        assert_eq!(bucket.update_replace_policy.as_deref(), Some("Retain"));

        let json: Value = serde_json::from_str(&template.to_json_pretty().expect("json"))
            .expect("template should parse");
        assert_eq!(json["Resources"][BUCKET_ID]["DeletionPolicy"], json!("Retain"));
        assert!(json["Resources"][TABLE_ID].get("DeletionPolicy").is_none());
    }

    #[test]
    fn deployment_depends_on_every_method() {
        let template = synthesize(&props());
        let deployment_id = template
            .ids_of_type("AWS::ApiGateway::Deployment")
            .next()
            .expect("deployment")
            .to_string();
        let deployment = template.resource(&deployment_id).expect("deployment");

        let mut expected: Vec<String> =
            HandlerKind::ALL.iter().map(|kind| method_id(*kind)).collect();
        expected.sort();
        assert_eq!(deployment.depends_on, expected);
    }
}
