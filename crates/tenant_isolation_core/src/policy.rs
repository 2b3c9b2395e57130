//! IAM policy documents attached to the scoped roles.
//!
//! The documents carry `${aws:PrincipalTag/<key>}` variables. IAM substitutes
//! the session tag of the assumed role at evaluation time, which is what keeps
//! a session tagged `alpha` out of `beta`'s partition and prefix. Resources are
//! JSON values so CloudFormation intrinsics (`Fn::GetAtt`, `Fn::Join`) can be
//! embedded directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const POLICY_VERSION: &str = "2012-10-17";

/// `operator -> (condition key -> values)`
pub type Conditions = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub condition: Conditions,
}

impl Statement {
    pub fn allow(actions: &[&str]) -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|action| action.to_string()).collect(),
            resource: None,
            condition: Conditions::new(),
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_resources(mut self, resources: Vec<Value>) -> Self {
        self.resource = Some(resources);
        self
    }

    pub fn with_condition(
        mut self,
        operator: &str,
        key: impl Into<String>,
        values: impl Into<Value>,
    ) -> Self {
        self.condition
            .entry(operator.to_string())
            .or_default()
            .insert(key.into(), values.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    pub fn to_value(&self) -> Value {
        // Every field is a string, a list or a map of those.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn principal_tag(tag_key: &str) -> String {
    format!("${{aws:PrincipalTag/{tag_key}}}")
}

/// Query and point reads restricted to partitions whose key equals the tag.
pub fn table_read_policy(table_arn: Value, tag_key: &str) -> PolicyDocument {
    PolicyDocument::new(vec![Statement::allow(&["dynamodb:Query", "dynamodb:GetItem"])
        .with_sid("TenantPartitionRead")
        .with_resources(vec![table_arn])
        .with_condition(
            "ForAllValues:StringEquals",
            "dynamodb:LeadingKeys",
            json!([principal_tag(tag_key)]),
        )])
}

pub fn table_write_policy(table_arn: Value, tag_key: &str) -> PolicyDocument {
    PolicyDocument::new(vec![Statement::allow(&["dynamodb:PutItem"])
        .with_sid("TenantPartitionWrite")
        .with_resources(vec![table_arn])
        .with_condition(
            "ForAllValues:StringEquals",
            "dynamodb:LeadingKeys",
            json!([principal_tag(tag_key)]),
        )])
}

/// Listing restricted to the tenant's `<tag>/` prefix.
pub fn bucket_read_policy(bucket_arn: Value, tag_key: &str) -> PolicyDocument {
    let tag = principal_tag(tag_key);
    PolicyDocument::new(vec![Statement::allow(&["s3:ListBucket"])
        .with_sid("TenantPrefixList")
        .with_resources(vec![bucket_arn])
        .with_condition("StringLike", "s3:prefix", json!([format!("{tag}/*")]))])
}

pub fn bucket_write_policy(bucket_arn: Value, tag_key: &str) -> PolicyDocument {
    let tag = principal_tag(tag_key);
    PolicyDocument::new(vec![Statement::allow(&["s3:PutObject"])
        .with_sid("TenantPrefixWrite")
        .with_resources(vec![object_arn(bucket_arn, &format!("{tag}/*"))])])
}

/// Trust policy letting `principal_arn` assume the role only while passing a
/// value for the tenant session tag.
pub fn session_tag_trust_policy(principal_arn: Value, tag_key: &str) -> PolicyDocument {
    PolicyDocument::new(vec![
        Statement::allow(&["sts:AssumeRole"])
            .with_principal(json!({ "AWS": principal_arn.clone() })),
        Statement::allow(&["sts:TagSession"])
            .with_principal(json!({ "AWS": principal_arn }))
            .with_condition(
                "StringLike",
                format!("aws:RequestTag/{tag_key}"),
                json!("*"),
            ),
    ])
}

pub fn service_trust_policy(service: &str) -> PolicyDocument {
    PolicyDocument::new(vec![
        Statement::allow(&["sts:AssumeRole"]).with_principal(json!({ "Service": service }))
    ])
}

/// Identity policy letting a function assume (and tag) the scoped role.
pub fn assume_scoped_role_policy(role_arn: Value) -> PolicyDocument {
    PolicyDocument::new(vec![Statement::allow(&["sts:AssumeRole", "sts:TagSession"])
        .with_resources(vec![role_arn])])
}

/// `<bucket_arn>/<suffix>`, joined with `Fn::Join` when the ARN is an intrinsic.
pub fn object_arn(bucket_arn: Value, suffix: &str) -> Value {
    match bucket_arn {
        Value::String(arn) => Value::String(format!("{arn}/{suffix}")),
        intrinsic => json!({ "Fn::Join": ["", [intrinsic, format!("/{suffix}")]] }),
    }
}
