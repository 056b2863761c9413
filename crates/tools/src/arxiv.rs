//! `search_arxiv`: the arXiv Atom query API.

use async_trait::async_trait;
use rookery_core::error::ToolError;
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::registry::SEARCH_ARXIV;
use crate::{http_client, optional_count, required_str};

const ARXIV_API: &str = "https://export.arxiv.org/api/query";
const DEFAULT_RESULTS: usize = 5;
const MAX_RESULTS: usize = 20;
const SUMMARY_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    pub title: String,
    pub authors: Vec<String>,
    pub published: String,
    pub url: String,
    pub summary: String,
}

pub struct ArxivSearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl ArxivSearchTool {
    pub fn new() -> Result<Self, ToolError> {
        Ok(Self {
            client: http_client(reqwest::Client::builder())?,
            endpoint: ARXIV_API.into(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ToolHandler for ArxivSearchTool {
    fn name(&self) -> &str {
        SEARCH_ARXIV
    }

    async fn call(&self, arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let query = required_str(&arguments, SEARCH_ARXIV, "query")?.trim();
        if query.is_empty() {
            return Err(ToolError::failed(SEARCH_ARXIV, "query must not be empty"));
        }
        let limit = optional_count(&arguments, "max_results", DEFAULT_RESULTS, MAX_RESULTS);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("search_query", format!("all:{query}")),
                ("start", "0".to_string()),
                ("max_results", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::failed(SEARCH_ARXIV, format!("arXiv request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::failed(
                SEARCH_ARXIV,
                format!("arXiv returned status {}", response.status()),
            ));
        }
        let feed = response
            .text()
            .await
            .map_err(|e| ToolError::failed(SEARCH_ARXIV, format!("failed to read feed: {e}")))?;

        let papers = parse_atom_feed(&feed, limit);
        debug!(query, papers = papers.len(), "arXiv search complete");
        Ok(ToolOutput::text(format_papers(query, &papers)))
    }
}

/// Extract entries from an arXiv Atom feed.
pub fn parse_atom_feed(feed: &str, max_results: usize) -> Vec<Paper> {
    let document = Html::parse_document(feed);
    let selectors = (
        Selector::parse("entry"),
        Selector::parse("title"),
        Selector::parse("author > name"),
        Selector::parse("published"),
        Selector::parse("id"),
        Selector::parse("summary"),
    );
    let (Ok(entry), Ok(title), Ok(author), Ok(published), Ok(id), Ok(summary)) = selectors else {
        return Vec::new();
    };

    document
        .select(&entry)
        .filter_map(|e| {
            let title = first_text(&e, &title)?;
            Some(Paper {
                title,
                authors: e.select(&author).map(|a| squash(&a.text().collect::<String>())).collect(),
                published: first_text(&e, &published)
                    .map(|p| p.chars().take(10).collect())
                    .unwrap_or_default(),
                url: first_text(&e, &id).unwrap_or_default(),
                summary: first_text(&e, &summary).unwrap_or_default(),
            })
        })
        .take(max_results)
        .collect()
}

fn first_text(element: &ElementRef, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|el| squash(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn format_papers(query: &str, papers: &[Paper]) -> String {
    if papers.is_empty() {
        return format!("No arXiv papers found for \"{query}\".");
    }
    let mut out = format!("arXiv results for \"{query}\":\n");
    for (i, paper) in papers.iter().enumerate() {
        let authors = match paper.authors.len() {
            0 => "unknown authors".to_string(),
            1..=3 => paper.authors.join(", "),
            _ => format!("{} et al.", paper.authors[0]),
        };
        out.push_str(&format!(
            "\n{}. {} ({})\n   {}\n   {}\n",
            i + 1,
            paper.title,
            paper.published,
            authors,
            paper.url
        ));
        if !paper.summary.is_empty() {
            let summary: String = paper.summary.chars().take(SUMMARY_CHARS).collect();
            let ellipsis = if paper.summary.chars().count() > SUMMARY_CHARS { "..." } else { "" };
            out.push_str(&format!("   {summary}{ellipsis}\n"));
        }
    }
    out
}
