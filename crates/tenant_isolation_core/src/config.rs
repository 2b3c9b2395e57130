use crate::contract::{
    HandlerKind, BUCKET_NAME, SESSION_DURATION_SECONDS, SESSION_TAG_KEY,
    SESSION_TAG_PREDEFINED_VALUE, TABLE_NAME,
};
use crate::error::{ConfigError, SessionError};
use crate::session::{validate_duration, SessionRequest, SessionTag};

pub const TABLE_NAME_ENV: &str = "TABLE_NAME";
pub const BUCKET_NAME_ENV: &str = "BUCKET_NAME";
pub const SESSION_TAG_KEY_ENV: &str = "SESSION_TAG_KEY";
pub const SESSION_TAG_VALUE_ENV: &str = "SESSION_TAG_VALUE";
pub const SESSION_DURATION_ENV: &str = "SESSION_DURATION_SECONDS";
pub const LOG_FILTER_ENV: &str = "TENANT_ISOLATION_LOG";

/// Value of `SESSION_TAG_VALUE` that tags each session with the requested tenant.
pub const REQUEST_TENANT_TAG: &str = "request";

/// Where the session tag value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValueSource {
    /// Every session carries the same value, whatever tenant is requested.
    Fixed(String),
    /// The session is tagged with the tenant id from the request.
    RequestTenant,
}

impl TagValueSource {
    pub fn resolve<'a>(&'a self, tenant_id: &'a str) -> &'a str {
        match self {
            Self::Fixed(value) => value,
            Self::RequestTenant => tenant_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub session_name: String,
    pub tag_key: String,
    pub tag_value: TagValueSource,
    pub duration_seconds: i32,
}

/// Runtime configuration of one role-assuming handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub kind: HandlerKind,
    /// `None` when the deployment did not inject the scoped role; requests are
    /// then refused rather than the function failing to start.
    pub role_arn: Option<String>,
    pub table_name: String,
    pub bucket_name: String,
    pub session: SessionSettings,
}

impl HandlerConfig {
    pub fn from_env(kind: HandlerKind) -> Result<Self, ConfigError> {
        Self::from_lookup(kind, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        kind: HandlerKind,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let tag_key = non_blank(SESSION_TAG_KEY_ENV).unwrap_or_else(|| SESSION_TAG_KEY.to_string());
        // Validates the key up front; the value is validated per request.
        SessionTag::new(tag_key.clone(), "")?;

        let tag_value = match non_blank(SESSION_TAG_VALUE_ENV) {
            None => TagValueSource::Fixed(SESSION_TAG_PREDEFINED_VALUE.to_string()),
            Some(value) if value == REQUEST_TENANT_TAG => TagValueSource::RequestTenant,
            Some(value) => {
                SessionTag::new(tag_key.clone(), value.clone())?;
                TagValueSource::Fixed(value)
            }
        };

        let duration_seconds = match non_blank(SESSION_DURATION_ENV) {
            None => SESSION_DURATION_SECONDS,
            Some(value) => value
                .trim()
                .parse::<i32>()
                .map_err(|_| ConfigError::NotAnInteger {
                    key: SESSION_DURATION_ENV,
                    value: value.clone(),
                })?,
        };
        validate_duration(duration_seconds)?;

        Ok(Self {
            kind,
            role_arn: non_blank(kind.role_arn_env_key()),
            table_name: non_blank(TABLE_NAME_ENV).unwrap_or_else(|| TABLE_NAME.to_string()),
            bucket_name: non_blank(BUCKET_NAME_ENV).unwrap_or_else(|| BUCKET_NAME.to_string()),
            session: SessionSettings {
                session_name: kind.session_name().to_string(),
                tag_key,
                tag_value,
                duration_seconds,
            },
        })
    }

    /// Builds the AssumeRole request for `tenant_id` against `role_arn`.
    pub fn session_request(
        &self,
        role_arn: &str,
        tenant_id: &str,
    ) -> Result<SessionRequest, SessionError> {
        let tag = SessionTag::new(
            self.session.tag_key.clone(),
            self.session.tag_value.resolve(tenant_id),
        )?;
        SessionRequest::new(
            role_arn,
            self.session.session_name.clone(),
            self.session.duration_seconds,
            vec![tag],
        )
    }
}

/// Configuration of the seed custom resource; it uses its own credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedConfig {
    pub table_name: String,
    pub bucket_name: String,
}

impl SeedConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            table_name: non_blank(TABLE_NAME_ENV).unwrap_or_else(|| TABLE_NAME.to_string()),
            bucket_name: non_blank(BUCKET_NAME_ENV).unwrap_or_else(|| BUCKET_NAME.to_string()),
        }
    }
}
