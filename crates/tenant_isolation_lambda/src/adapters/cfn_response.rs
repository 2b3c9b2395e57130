use reqwest::header::CONTENT_TYPE;
use tenant_isolation_core::seed::CustomResourceResponse;

use crate::adapters::AdapterError;

/// Uploads a custom resource result to the pre-signed `ResponseURL`.
///
/// The URL is signed without a content type, so the header must be sent empty.
pub async fn send_custom_resource_response(
    client: &reqwest::Client,
    response_url: &str,
    response: &CustomResourceResponse,
) -> Result<(), AdapterError> {
    let body = serde_json::to_vec(response)
        .map_err(|error| AdapterError::Request(format!("unserializable response: {error}")))?;

    let status = client
        .put(response_url)
        .header(CONTENT_TYPE, "")
        .body(body)
        .send()
        .await
        .map_err(|error| AdapterError::Request(error.to_string()))?
        .status();

    if !status.is_success() {
        return Err(AdapterError::Request(format!(
            "custom resource response rejected with HTTP {status}"
        )));
    }
    Ok(())
}
