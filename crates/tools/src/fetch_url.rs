//! `fetch_url`: read a page from an allowlisted host as plain text.
//!
//! The executor checks the host list before dispatch. This handler checks
//! again, resolves the name and refuses internal addresses, and never
//! follows redirects.

use std::sync::Arc;

use async_trait::async_trait;
use rookery_core::error::ToolError;
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};
use rookery_security::{HostAllowlist, resolve_and_check};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use crate::registry::FETCH_URL;
use crate::{http_client, required_str};

const NOISE_TAGS: [&str; 8] = ["script", "style", "nav", "footer", "header", "noscript", "svg", "iframe"];
const CONTENT_ROOTS: [&str; 5] = ["article", "main", "[role=\"main\"]", ".content", "#content"];

pub struct FetchUrlTool {
    client: reqwest::Client,
    allowlist: Arc<HostAllowlist>,
    max_chars: usize,
}

impl FetchUrlTool {
    pub fn new(allowlist: Arc<HostAllowlist>, max_chars: usize) -> Result<Self, ToolError> {
        let client = http_client(reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()))?;
        Ok(Self {
            client,
            allowlist,
            max_chars: max_chars.max(1),
        })
    }
}

#[async_trait]
impl ToolHandler for FetchUrlTool {
    fn name(&self) -> &str {
        FETCH_URL
    }

    async fn call(&self, arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let url = self.allowlist.check(required_str(&arguments, FETCH_URL, "url")?)?;
        resolve_and_check(&url).await?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ToolError::failed(FETCH_URL, format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_redirection() {
            let target = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown location");
            return Err(ToolError::failed(
                FETCH_URL,
                format!("redirect to {target} was not followed; fetch that URL directly if it is allowed"),
            ));
        }
        if !status.is_success() {
            return Err(ToolError::failed(FETCH_URL, format!("HTTP {status}")));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|ct| ct.contains("html"));
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::failed(FETCH_URL, format!("failed to read body: {e}")))?;

        let text = if is_html { extract_text_from_html(&body) } else { body.trim().to_string() };
        debug!(url = %url, chars = text.chars().count(), "Fetched page");

        if text.is_empty() {
            return Ok(ToolOutput::text(format!("{url} returned no readable text.")));
        }
        Ok(ToolOutput::text(truncate_chars(&text, self.max_chars)))
    }
}

/// Cut `text` to at most `max` characters, marking the cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}\n\n[truncated]", &text[..end]),
        None => text.to_string(),
    }
}

/// Readable text of an HTML document: title, then the main content with
/// scripts and page chrome removed.
pub fn extract_text_from_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut output = String::new();

    if let Ok(title_sel) = Selector::parse("title")
        && let Some(title_el) = document.select(&title_sel).next()
    {
        let title = title_el.text().collect::<String>();
        let title = title.trim();
        if !title.is_empty() {
            output.push_str("# ");
            output.push_str(title);
            output.push_str("\n\n");
        }
    }

    let noise: Vec<Selector> = NOISE_TAGS.iter().filter_map(|t| Selector::parse(t).ok()).collect();

    let root = CONTENT_ROOTS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|s| document.select(&s).next())
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|s| document.select(&s).next())
        })
        .unwrap_or_else(|| document.root_element());

    collect_text(&root, &noise, &mut output);

    // at most one blank line in a row, no trailing spaces
    let mut cleaned = String::with_capacity(output.len());
    let mut newlines = 0;
    for line in output.split('\n') {
        let line = line.trim_end();
        if line.trim().is_empty() {
            newlines += 1;
            if newlines <= 1 {
                cleaned.push('\n');
            }
        } else {
            newlines = 0;
            cleaned.push_str(line.trim_start());
            cleaned.push('\n');
        }
    }
    cleaned.trim().to_string()
}

fn collect_text(element: &ElementRef, noise: &[Selector], output: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    output.push_str(trimmed);
                    output.push(' ');
                }
            }
            Node::Element(_) => {
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                if noise.iter().any(|sel| sel.matches(&child_ref)) {
                    continue;
                }

                let tag = child_ref.value().name();
                let is_block = matches!(
                    tag,
                    "p" | "div"
                        | "h1"
                        | "h2"
                        | "h3"
                        | "h4"
                        | "h5"
                        | "h6"
                        | "li"
                        | "br"
                        | "tr"
                        | "blockquote"
                        | "pre"
                        | "section"
                );
                if is_block {
                    output.push('\n');
                }
                if let Some(level) = tag
                    .strip_prefix('h')
                    .filter(|rest| rest.len() == 1)
                    .and_then(|rest| rest.parse::<usize>().ok())
                {
                    output.push_str(&"#".repeat(level));
                    output.push(' ');
                }

                collect_text(&child_ref, noise, output);

                if is_block {
                    output.push('\n');
                }
            }
            _ => {}
        }
    }
}
