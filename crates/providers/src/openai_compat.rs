//! OpenAI-compatible completion and embedding client.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions` and `/embeddings`.
//!
//! Tool use is negotiated in plain text by the agent loop, so requests never
//! carry native function definitions. Tool turns are sent with the `user`
//! role; the prompt builder already labels their content.

use std::time::Duration;

use async_trait::async_trait;
use rookery_config::AppConfig;
use rookery_core::error::{MemoryError, ProviderError};
use rookery_core::memory::Embedder;
use rookery_core::message::Role;
use rookery_core::provider::{Completion, CompletionRequest, CompletionService};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{check_status, network_error};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// A client for one OpenAI-compatible endpoint.
///
/// Shared behind `Arc`; the inner `reqwest::Client` pools connections.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            embedding_model: "text-embedding-3-small".into(),
            client,
        })
    }

    /// Build from the provider and memory sections of the app config.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        Ok(Self::new("openai_compat", &config.api_url, config.api_key.clone(), &config.model)?
            .with_embedding_model(&config.memory.embedding_model))
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn request_embedding(
        &self,
        body: &serde_json::Value,
    ) -> Result<EmbeddingResponse, ProviderError> {
        let response = self
            .post("/embeddings")
            .json(body)
            .send()
            .await
            .map_err(|e| network_error(e, HTTP_TIMEOUT.as_millis() as u64))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}")))
    }

    fn to_api_messages(request: &CompletionRequest) -> Vec<ApiMessage<'_>> {
        std::iter::once(ApiMessage {
            role: "system",
            content: &request.system,
        })
        .chain(request.messages.iter().map(|m| ApiMessage {
            role: match m.role {
                Role::Assistant => "assistant",
                Role::User | Role::Tool => "user",
            },
            content: &m.content,
        }))
        .collect()
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: Self::to_api_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        debug!(provider = %self.name, model = %self.model, messages = body.messages.len(), "Sending completion request");

        let response = self
            .post("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(e, HTTP_TIMEOUT.as_millis() as u64))?;
        let response = check_status(response).await?;

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            model: api_response.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": [text],
            "encoding_format": "float",
        });

        debug!(provider = %self.name, model = %self.embedding_model, "Sending embedding request");

        let api_response = self
            .request_embedding(&body)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        api_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemoryError::EmbeddingFailed("No embedding in response".into()))
    }
}

// --- OpenAI API types (internal) ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_core::provider::PromptMessage;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenAiCompatClient {
        OpenAiCompatClient::new("test", server.uri(), Some("sk-test".into()), "gpt-test").unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            "You are helpful.",
            vec![
                PromptMessage::new(Role::User, "What is 2+2?"),
                PromptMessage::new(Role::Tool, "Tool result: 4"),
            ],
        )
    }

    #[tokio::test]
    async fn complete_sends_system_first_and_parses_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "You are helpful."},
                    {"role": "user", "content": "What is 2+2?"},
                    {"role": "user", "content": "Tool result: 4"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-test-0601",
                "choices": [{"message": {"role": "assistant", "content": "4"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = client(&server).complete(request()).await.unwrap();
        assert_eq!(completion.text, "4");
        assert_eq!(completion.model, "gpt-test-0601");
    }

    async fn error_for_status(status: u16) -> ProviderError {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;
        client(&server).complete(request()).await.unwrap_err()
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        assert!(matches!(
            error_for_status(401).await,
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            error_for_status(429).await,
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            error_for_status(500).await,
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn embed_returns_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"model": "embed-small", "input": ["hello"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.5, -0.25, 1.0]}]
            })))
            .mount(&server)
            .await;

        let embedder = client(&server).with_embedding_model("embed-small");
        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.5, -0.25, 1.0]);
    }

    #[tokio::test]
    async fn embed_failure_is_memory_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).embed("hello").await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingFailed(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = OpenAiCompatClient::new("x", "http://localhost:11434/v1/", None, "llama3").unwrap();
        assert_eq!(c.base_url, "http://localhost:11434/v1");
        assert_eq!(c.model(), "llama3");
    }
}
