//! Remote collaborators for Rookery.
//!
//! - [`OpenAiCompatClient`]: chat completions and embeddings against any
//!   OpenAI-compatible endpoint (OpenAI, OpenRouter, Ollama, vLLM, ...)
//! - [`HttpImageService`]: text-to-image over a plain JSON endpoint

pub mod image;
pub mod openai_compat;

pub use image::HttpImageService;
pub use openai_compat::OpenAiCompatClient;

use rookery_core::error::ProviderError;

/// Map a non-success HTTP status to the matching provider error.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        return Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        tracing::warn!(status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

pub(crate) fn network_error(e: reqwest::Error, timeout_ms: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout { timeout_ms }
    } else {
        ProviderError::Network(e.to_string())
    }
}
