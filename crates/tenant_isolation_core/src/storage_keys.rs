//! Tenant-scoped object keys.
//!
//! Objects live under `<tenant_id>/`, which is the prefix the scoped role's
//! policy pins to `${aws:PrincipalTag/TenantId}/*`.

const KEY_SEPARATOR: char = '/';

/// Checks that `tenant_id` can serve as both a session tag value and a single
/// key segment.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), String> {
    if tenant_id.is_empty() {
        return Err("tenant id cannot be empty".to_string());
    }
    if tenant_id.len() > 128 {
        return Err("tenant id cannot exceed 128 characters".to_string());
    }
    if let Some(invalid) = tenant_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "_.:=+-@".contains(*c)))
    {
        return Err(format!("tenant id contains disallowed character {invalid:?}"));
    }
    if tenant_id == "." || tenant_id == ".." {
        return Err("tenant id cannot be a relative path segment".to_string());
    }
    Ok(())
}

/// Listing prefix for one tenant. The trailing separator keeps `alpha` from
/// matching `alphabet/...`.
pub fn tenant_prefix(tenant_id: &str) -> String {
    format!("{tenant_id}{KEY_SEPARATOR}")
}

pub fn tenant_object_key(tenant_id: &str, file_name: &str) -> Result<String, String> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err("file name cannot be empty".to_string());
    }
    if file_name.starts_with(KEY_SEPARATOR) {
        return Err("file name cannot start with '/'".to_string());
    }
    if file_name
        .split(KEY_SEPARATOR)
        .any(|segment| segment == "." || segment == "..")
    {
        return Err("file name cannot contain relative path segments".to_string());
    }
    Ok(format!("{}{file_name}", tenant_prefix(tenant_id)))
}
