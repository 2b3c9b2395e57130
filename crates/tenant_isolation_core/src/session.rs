//! Construction of tag-scoped AssumeRole requests.
//!
//! Nothing here grants or checks access. The session tags built by this module
//! are what the scoped role's policy conditions compare against
//! (`${aws:PrincipalTag/<key>}`), so the validation mirrors the limits STS
//! itself enforces and lets a bad request fail before the network call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub const MIN_SESSION_DURATION_SECONDS: i32 = 900;
pub const MAX_SESSION_DURATION_SECONDS: i32 = 43_200;

const MAX_TAG_KEY_LEN: usize = 128;
const MAX_TAG_VALUE_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTag {
    pub key: String,
    pub value: String,
}

impl SessionTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, SessionError> {
        let key = key.into();
        let value = value.into();

        if key.is_empty()
            || key.chars().count() > MAX_TAG_KEY_LEN
            || !key.chars().all(is_tag_char)
        {
            return Err(SessionError::InvalidTagKey(key));
        }
        if value.chars().count() > MAX_TAG_VALUE_LEN || !value.chars().all(is_tag_char) {
            return Err(SessionError::InvalidTagValue(value));
        }

        Ok(Self { key, value })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub role_arn: String,
    pub session_name: String,
    pub duration_seconds: i32,
    pub tags: Vec<SessionTag>,
}

impl SessionRequest {
    pub fn new(
        role_arn: impl Into<String>,
        session_name: impl Into<String>,
        duration_seconds: i32,
        tags: Vec<SessionTag>,
    ) -> Result<Self, SessionError> {
        let role_arn = role_arn.into();
        let session_name = session_name.into();

        if !is_role_arn(&role_arn) {
            return Err(SessionError::InvalidRoleArn(role_arn));
        }
        if !is_session_name(&session_name) {
            return Err(SessionError::InvalidSessionName(session_name));
        }
        validate_duration(duration_seconds)?;

        Ok(Self {
            role_arn,
            session_name,
            duration_seconds,
            tags,
        })
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }
}

/// Short-lived credentials returned by a successful AssumeRole call.
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<String>,
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .finish()
    }
}

pub fn validate_duration(duration_seconds: i32) -> Result<(), SessionError> {
    if (MIN_SESSION_DURATION_SECONDS..=MAX_SESSION_DURATION_SECONDS).contains(&duration_seconds) {
        Ok(())
    } else {
        Err(SessionError::DurationOutOfRange(duration_seconds))
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || (c.is_whitespace() && !c.is_control()) || "_.:/=+-@".contains(c)
}

fn is_session_name(name: &str) -> bool {
    (2..=64).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_+=,.@-".contains(c))
}

fn is_role_arn(arn: &str) -> bool {
    let mut parts = arn.splitn(6, ':');
    matches!(
        (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ),
        (Some("arn"), Some(partition), Some("iam"), Some(""), Some(_account), Some(resource))
            if !partition.is_empty()
                && resource.starts_with("role/")
                && resource.len() > "role/".len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/TableReaderScopedRole";

    #[test]
    fn builds_tagged_request() {
        let tag = SessionTag::new("TenantId", "alpha").expect("tag should be valid");
        let request = SessionRequest::new(ROLE_ARN, "DynamodbReaderSession", 900, vec![tag])
            .expect("request should be valid");

        assert_eq!(request.tag("TenantId"), Some("alpha"));
        assert_eq!(request.tag("Other"), None);
    }

    #[test]
    fn rejects_non_role_arns() {
        for arn in [
            "",
            "arn:aws:iam::123456789012:user/alice",
            "arn:aws:s3:::bucket",
            "arn:aws:iam::123456789012:role/",
        ] {
            let error = SessionRequest::new(arn, "Session", 900, Vec::new())
                .expect_err("arn should be rejected");
            assert_eq!(error, SessionError::InvalidRoleArn(arn.to_string()));
        }
    }

    #[test]
    fn rejects_out_of_range_duration() {
        let error = SessionRequest::new(ROLE_ARN, "Session", 899, Vec::new())
            .expect_err("duration should be rejected");
        assert_eq!(error, SessionError::DurationOutOfRange(899));
        assert!(validate_duration(MAX_SESSION_DURATION_SECONDS).is_ok());
    }

    #[test]
    fn rejects_bad_session_names() {
        assert!(SessionRequest::new(ROLE_ARN, "x", 900, Vec::new()).is_err());
        assert!(SessionRequest::new(ROLE_ARN, "has space", 900, Vec::new()).is_err());
        assert!(SessionRequest::new(ROLE_ARN, "a".repeat(65), 900, Vec::new()).is_err());
    }

    #[test]
    fn tag_validation_matches_sts_character_set() {
        assert!(SessionTag::new("TenantId", "tenant-01@org.example").is_ok());
        assert!(SessionTag::new("TenantId", "").is_ok());
        assert!(SessionTag::new("", "alpha").is_err());
        assert!(SessionTag::new("TenantId", "alpha;drop").is_err());
        assert!(SessionTag::new("TenantId", "a".repeat(257)).is_err());
    }

    #[test]
    fn control_whitespace_is_not_a_tag_character() {
        assert!(SessionTag::new("TenantId", "tenant alpha").is_ok());
        assert!(matches!(
            SessionTag::new("TenantId", "tenant\talpha"),
            Err(SessionError::InvalidTagValue(_))
        ));
        assert!(SessionTag::new("TenantId", "alpha\n").is_err());
        assert!(SessionTag::new("Tenant\tId", "alpha").is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let credentials = TemporaryCredentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "super-secret".to_string(),
            session_token: "token-value".to_string(),
            expiration: None,
        };

        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("ASIAEXAMPLE"));
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("token-value"));
    }
}
