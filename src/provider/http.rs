//! Shared HTTP plumbing for provider clients: client construction and error mapping.

use crate::error::ApiError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response};
use std::time::Duration;

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_http_client() -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(PROVIDER_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

/// Map transport-level failures (no HTTP status available).
pub(crate) fn map_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout(format!("Provider request timed out: {}", error))
    } else if error.is_connect() {
        ApiError::NetworkError(format!("Connection error: {}", error))
    } else if error.is_decode() {
        ApiError::ProviderError(format!("Failed to decode response: {}", error))
    } else {
        ApiError::NetworkError(format!("HTTP error: {}", error))
    }
}

/// Map a non-success HTTP status to the error taxonomy used by the retry policy.
pub(crate) fn map_status(status: u16, body: &str, retry_after: Option<Duration>) -> ApiError {
    let detail = body.trim();
    match status {
        401 | 403 => ApiError::ProviderAuthFailed(format!("HTTP {}: {}", status, detail)),
        404 => ApiError::ProviderModelNotFound(format!("HTTP 404: {}", detail)),
        408 => ApiError::Timeout(format!("HTTP 408: {}", detail)),
        429 => ApiError::ProviderRateLimit {
            message: format!("HTTP 429: {}", detail),
            retry_after,
        },
        500..=599 => ApiError::NetworkError(format!("HTTP {}: {}", status, detail)),
        _ => ApiError::ProviderRequestFailed(format!("HTTP {}: {}", status, detail)),
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Turn an error response into an `ApiError`, passing successful ones through.
pub(crate) async fn check_response(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = parse_retry_after(response.headers());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(map_status(status.as_u16(), &body, retry_after))
}
