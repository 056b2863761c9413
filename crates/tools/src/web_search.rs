//! `web_search`: DuckDuckGo's HTML endpoint, parsed with `scraper`.

use async_trait::async_trait;
use rookery_core::error::ToolError;
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};
use scraper::{Html, Selector};
use tracing::debug;

use crate::registry::WEB_SEARCH;
use crate::{http_client, optional_count, required_str};

const DUCKDUCKGO_HTML: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 10;

/// One parsed search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    default_results: usize,
}

impl WebSearchTool {
    pub fn new(default_results: usize) -> Result<Self, ToolError> {
        Ok(Self {
            client: http_client(reqwest::Client::builder())?,
            endpoint: DUCKDUCKGO_HTML.into(),
            default_results: default_results.clamp(1, MAX_RESULTS),
        })
    }

    /// Point the tool at a different search endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH
    }

    async fn call(&self, arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let query = required_str(&arguments, WEB_SEARCH, "query")?.trim();
        if query.is_empty() {
            return Err(ToolError::failed(WEB_SEARCH, "query must not be empty"));
        }
        let limit = optional_count(&arguments, "num_results", self.default_results, MAX_RESULTS);

        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::failed(WEB_SEARCH, format!("search request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::failed(
                WEB_SEARCH,
                format!("search returned status {}", response.status()),
            ));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ToolError::failed(WEB_SEARCH, format!("failed to read results: {e}")))?;
        let hits = parse_duckduckgo_html(&html, limit);
        debug!(query, hits = hits.len(), "Web search complete");

        Ok(ToolOutput::text(format_hits(query, &hits)))
    }
}

fn format_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results found for \"{query}\".");
    }
    let mut out = format!("Search results for \"{query}\":\n");
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!("\n{}. {}\n   {}\n", i + 1, hit.title, hit.url));
        if !hit.snippet.is_empty() {
            out.push_str(&format!("   {}\n", hit.snippet));
        }
    }
    out
}

/// Parse a DuckDuckGo HTML results page.
pub fn parse_duckduckgo_html(html: &str, max_results: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse(".result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    document
        .select(&result_sel)
        .filter_map(|element| {
            let link = element.select(&link_sel).next()?;
            let title = collapse_whitespace(&link.text().collect::<String>());
            let url = normalize_duckduckgo_url(link.value().attr("href").unwrap_or(""));
            let snippet = element
                .select(&snippet_sel)
                .next()
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .unwrap_or_default();
            (!title.is_empty() && !url.is_empty()).then_some(SearchHit { title, url, snippet })
        })
        .take(max_results)
        .collect()
}

/// Resolve DuckDuckGo redirect links (`/l/?uddg=<target>`) to their target.
pub fn normalize_duckduckgo_url(raw_url: &str) -> String {
    let absolute = if raw_url.starts_with("//") {
        format!("https:{raw_url}")
    } else {
        raw_url.to_string()
    };
    let Ok(parsed) = url::Url::parse(&absolute) else {
        return raw_url.to_string();
    };

    if parsed.domain().is_some_and(|d| d.ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/")
        && let Some((_, target)) = parsed.query_pairs().find(|(key, _)| key == "uddg")
    {
        return target.into_owned();
    }
    absolute
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
