//! `generate_image`: hands the prompt to the configured image service.

use std::sync::Arc;

use async_trait::async_trait;
use rookery_core::error::ToolError;
use rookery_core::provider::{ImageRequest, ImageService};
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};
use tracing::info;

use crate::registry::GENERATE_IMAGE;
use crate::{optional_str, required_str};

pub struct GenerateImageTool {
    service: Arc<dyn ImageService>,
}

impl GenerateImageTool {
    pub fn new(service: Arc<dyn ImageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for GenerateImageTool {
    fn name(&self) -> &str {
        GENERATE_IMAGE
    }

    async fn call(&self, arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let request = ImageRequest {
            prompt: required_str(&arguments, GENERATE_IMAGE, "prompt")?.trim().to_string(),
            negative_prompt: optional_str(&arguments, "negative_prompt").map(str::to_string),
            style: optional_str(&arguments, "style").map(str::to_string),
        };

        let artifact = self
            .service
            .generate(request)
            .await
            .map_err(|e| ToolError::failed(GENERATE_IMAGE, format!("image generation failed: {e}")))?;

        info!(service = self.service.name(), artifact = %artifact, "Image generated");
        Ok(ToolOutput {
            text: format!("Image generated: {artifact}"),
            artifact: Some(artifact),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_core::error::ProviderError;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingImages {
        requests: Mutex<Vec<ImageRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl ImageService for RecordingImages {
        fn name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, request: ImageRequest) -> Result<String, ProviderError> {
            self.requests.lock().unwrap().push(request);
            if self.fail {
                return Err(ProviderError::Network("connection refused".into()));
            }
            Ok("https://images.example/cat.png".into())
        }
    }

    #[tokio::test]
    async fn returns_artifact_reference() {
        let service = Arc::new(RecordingImages::default());
        let tool = GenerateImageTool::new(service.clone());
        let args = json!({"prompt": " a cat ", "style": "anime"}).as_object().cloned().unwrap();

        let out = tool.call(args, ToolContext::default()).await.unwrap();
        assert_eq!(out.artifact.as_deref(), Some("https://images.example/cat.png"));
        assert_eq!(out.text, "Image generated: https://images.example/cat.png");

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests[0].prompt, "a cat");
        assert_eq!(requests[0].style.as_deref(), Some("anime"));
        assert!(requests[0].negative_prompt.is_none());
    }

    #[tokio::test]
    async fn service_failure_is_tool_failure() {
        let tool = GenerateImageTool::new(Arc::new(RecordingImages { fail: true, ..Default::default() }));
        let args = json!({"prompt": "a cat"}).as_object().cloned().unwrap();
        let err = tool.call(args, ToolContext::default()).await.unwrap_err();
        assert!(err.to_string().starts_with("image generation failed"));
    }
}
