//! `wikipedia_summary`: the English Wikipedia REST summary endpoint.

use async_trait::async_trait;
use rookery_core::error::ToolError;
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};
use serde::Deserialize;

use crate::registry::WIKIPEDIA_SUMMARY;
use crate::{http_client, required_str};

const WIKIPEDIA_REST: &str = "https://en.wikipedia.org/api/rest_v1";

pub struct WikipediaSummaryTool {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default, rename = "type")]
    page_type: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

impl WikipediaSummaryTool {
    pub fn new() -> Result<Self, ToolError> {
        Ok(Self {
            client: http_client(reqwest::Client::builder())?,
            base_url: WIKIPEDIA_REST.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Article titles use underscores for spaces.
fn title_slug(topic: &str) -> String {
    urlencoding::encode(&topic.split_whitespace().collect::<Vec<_>>().join("_")).into_owned()
}

#[async_trait]
impl ToolHandler for WikipediaSummaryTool {
    fn name(&self) -> &str {
        WIKIPEDIA_SUMMARY
    }

    async fn call(&self, arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let topic = required_str(&arguments, WIKIPEDIA_SUMMARY, "topic")?.trim();
        if topic.is_empty() {
            return Err(ToolError::failed(WIKIPEDIA_SUMMARY, "topic must not be empty"));
        }

        let url = format!("{}/page/summary/{}", self.base_url, title_slug(topic));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::failed(WIKIPEDIA_SUMMARY, format!("Wikipedia request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(ToolOutput::text(format!("No Wikipedia article found for \"{topic}\".")));
        }
        if !response.status().is_success() {
            return Err(ToolError::failed(
                WIKIPEDIA_SUMMARY,
                format!("Wikipedia returned status {}", response.status()),
            ));
        }

        let summary: PageSummary = response
            .json()
            .await
            .map_err(|e| ToolError::failed(WIKIPEDIA_SUMMARY, format!("unexpected response: {e}")))?;

        let mut text = format!("{}\n\n{}", summary.title, summary.extract.trim());
        if summary.page_type == "disambiguation" {
            text.push_str("\n\n(This is a disambiguation page; try a more specific topic.)");
        }
        if let Some(page) = summary.content_urls.and_then(|c| c.desktop).map(|d| d.page) {
            text.push_str(&format!("\n\nSource: {page}"));
        }
        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(topic: &str) -> ToolArguments {
        json!({ "topic": topic }).as_object().cloned().unwrap()
    }

    #[test]
    fn slugs_use_underscores() {
        assert_eq!(title_slug("Rust  (programming language)"), "Rust_%28programming_language%29");
    }

    #[tokio::test]
    async fn returns_title_extract_and_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page/summary/Mount_Fuji"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "standard",
                "title": "Mount Fuji",
                "extract": "Mount Fuji is the tallest mountain in Japan.",
                "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Mount_Fuji"}}
            })))
            .mount(&server)
            .await;

        let tool = WikipediaSummaryTool::new().unwrap().with_base_url(server.uri());
        let out = tool.call(args("Mount Fuji"), ToolContext::default()).await.unwrap();
        assert!(out.text.starts_with("Mount Fuji\n\nMount Fuji is the tallest"));
        assert!(out.text.ends_with("Source: https://en.wikipedia.org/wiki/Mount_Fuji"));
    }

    #[tokio::test]
    async fn missing_article_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = WikipediaSummaryTool::new().unwrap().with_base_url(server.uri());
        let out = tool.call(args("Qwxzz"), ToolContext::default()).await.unwrap();
        assert_eq!(out.text, "No Wikipedia article found for \"Qwxzz\".");
    }

    #[tokio::test]
    async fn server_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tool = WikipediaSummaryTool::new().unwrap().with_base_url(server.uri());
        let err = tool.call(args("Tokyo"), ToolContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
