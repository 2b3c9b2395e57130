use thiserror::Error;

use crate::contract::{EMAIL_PARAM, FILE_NAME_PARAM, TENANT_ID_PARAM, TEXT_PARAM};

/// Rejections of an AssumeRole request before it reaches STS.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("role ARN '{0}' is not a valid IAM role ARN")]
    InvalidRoleArn(String),

    #[error("session name '{0}' must be 2-64 characters of [A-Za-z0-9+=,.@_-]")]
    InvalidSessionName(String),

    #[error("session duration {0}s is outside 900..=43200")]
    DurationOutOfRange(i32),

    #[error("session tag key '{0}' must be 1-128 allowed characters")]
    InvalidTagKey(String),

    #[error("session tag value '{0}' must be at most 256 allowed characters")]
    InvalidTagValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be an integer, got '{value}'")]
    NotAnInteger { key: &'static str, value: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Every way a tenant-scoped request can be refused.
///
/// Variants without an error code are rendered as `{"message": ...}`, the rest
/// as `{"error": {"code", "message"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Access role not found")]
    MissingRole,

    #[error("{}", missing_parameter_message(.0))]
    MissingParameter(&'static str),

    #[error("Tenant ID '{0}' is not a valid tenant identifier")]
    InvalidTenant(String),

    #[error("{name} is invalid: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{0}")]
    Misconfigured(String),

    #[error("{0}")]
    AssumeRole(String),

    #[error("{0}")]
    Store(String),
}

impl AccessError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Misconfigured(_) => 500,
            _ => 403,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::MissingRole
            | Self::MissingParameter(_)
            | Self::InvalidTenant(_)
            | Self::InvalidParameter { .. } => None,
            Self::Misconfigured(_) => Some("misconfiguration"),
            Self::AssumeRole(_) => Some("assume_role_failed"),
            Self::Store(_) => Some("store_operation_failed"),
        }
    }
}

impl From<ConfigError> for AccessError {
    fn from(error: ConfigError) -> Self {
        Self::Misconfigured(error.to_string())
    }
}

impl From<SessionError> for AccessError {
    fn from(error: SessionError) -> Self {
        Self::Misconfigured(error.to_string())
    }
}

fn missing_parameter_message(name: &str) -> String {
    match name {
        TENANT_ID_PARAM => "Tenant ID is required".to_string(),
        EMAIL_PARAM => "Email is required".to_string(),
        FILE_NAME_PARAM => "File name is required".to_string(),
        TEXT_PARAM => "Text is required".to_string(),
        other => format!("{other} is required"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_forbidden_with_code() {
        let error = AccessError::Store("AccessDeniedException".to_string());
        assert_eq!(error.status_code(), 403);
        assert_eq!(error.code(), Some("store_operation_failed"));
    }

    #[test]
    fn session_validation_surfaces_as_misconfiguration() {
        let error = AccessError::from(SessionError::DurationOutOfRange(60));
        assert_eq!(error.status_code(), 500);
        assert_eq!(error.to_string(), "session duration 60s is outside 900..=43200");
    }

    #[test]
    fn missing_parameters_use_human_messages() {
        assert_eq!(
            AccessError::MissingParameter(FILE_NAME_PARAM).to_string(),
            "File name is required"
        );
        assert_eq!(
            AccessError::MissingParameter("region").to_string(),
            "region is required"
        );
    }
}
