//! HTTP plumbing shared by the remote providers.

use std::time::Duration;

use quizlink_core::error::ProviderError;

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Seconds to wait on a 429 without a usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// System prompt used when a request does not bring its own.
pub(crate) const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful assistant maintaining an educational question bank. Follow the requested output format exactly and do not add commentary.";

pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}

pub(crate) fn send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(DEFAULT_TIMEOUT_SECS)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

/// Map an error status to a [`ProviderError`]; successful responses pass
/// through. `api_message` pulls a readable message out of an error body.
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
    api_message: fn(&str) -> Option<String>,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }

    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
            * 1000;
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        401 | 403 => ProviderError::AuthenticationFailed(body),
        404 => ProviderError::ModelNotFound(model.to_string()),
        _ => ProviderError::ApiError {
            status,
            message: api_message(&body).unwrap_or(body),
        },
    })
}

pub(crate) fn parse_error(e: reqwest::Error) -> ProviderError {
    ProviderError::ApiError {
        status: 0,
        message: format!("failed to parse response: {e}"),
    }
}
