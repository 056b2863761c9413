//! Text-to-image over a JSON HTTP endpoint.
//!
//! The request body is the serialized [`ImageRequest`]. Responses may carry
//! the artifact as `url`, `path`, or OpenAI-style `data[0].url`.

use std::time::Duration;

use async_trait::async_trait;
use rookery_config::ImageConfig;
use rookery_core::error::ProviderError;
use rookery_core::provider::{ImageRequest, ImageService};
use serde_json::Value;
use tracing::{debug, info};

use crate::{check_status, network_error};

const IMAGE_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HttpImageService {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpImageService {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(IMAGE_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }

    /// `None` when no endpoint is configured.
    pub fn from_config(config: &ImageConfig) -> Result<Option<Self>, ProviderError> {
        config
            .endpoint
            .as_deref()
            .map(|endpoint| Self::new(endpoint, config.api_key.clone()))
            .transpose()
    }

    fn extract_artifact(body: &Value) -> Option<String> {
        body.get("url")
            .or_else(|| body.get("path"))
            .or_else(|| body.pointer("/data/0/url"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl ImageService for HttpImageService {
    fn name(&self) -> &str {
        "http_image"
    }

    async fn generate(&self, request: ImageRequest) -> Result<String, ProviderError> {
        debug!(endpoint = %self.endpoint, style = ?request.style, "Requesting image");

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| network_error(e, IMAGE_TIMEOUT.as_millis() as u64))?;
        let response = check_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse image response: {e}")))?;

        let artifact = Self::extract_artifact(&body)
            .ok_or_else(|| ProviderError::InvalidResponse("image response has no url or path".into()))?;
        info!(artifact = %artifact, "Image generated");
        Ok(artifact)
    }
}
