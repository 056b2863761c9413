//! The fixed tool catalog.
//!
//! Built once at startup and shared read-only by every agent run. It owns
//! only [`ToolSpec`] data; implementations are attached in the executor.

use std::collections::HashMap;
use std::fmt::Write as _;

use rookery_core::tool::{ParamType, ToolParameter, ToolSpec};
use rookery_core::{Error, Result};

pub const WEB_SEARCH: &str = "web_search";
pub const FETCH_URL: &str = "fetch_url";
pub const SEARCH_ARXIV: &str = "search_arxiv";
pub const GET_TIME: &str = "get_time";
pub const CALCULATE: &str = "calculate";
pub const WIKIPEDIA_SUMMARY: &str = "wikipedia_summary";
pub const THINK: &str = "think";
pub const GENERATE_IMAGE: &str = "generate_image";
pub const REMEMBER: &str = "remember";
pub const RECALL: &str = "recall";

pub const IMAGE_STYLES: &[&str] = &["photo", "illustration", "anime", "painting", "sketch"];
pub const FACT_CATEGORIES: &[&str] = &["preference", "personal", "work", "hobby", "other"];

/// An immutable, name-indexed catalog of tool specs.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a catalog from `specs`, keeping their order.
    ///
    /// Fails if two specs share a name.
    pub fn new(specs: Vec<ToolSpec>) -> Result<Self> {
        let mut index = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(Error::Config {
                    message: format!("duplicate tool name '{}'", spec.name),
                });
            }
        }
        Ok(Self { specs, index })
    }

    /// The standard ten-tool catalog.
    pub fn builtin() -> Self {
        let specs = builtin_specs();
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Self { specs, index }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Render the model-facing tool reference.
    ///
    /// Deterministic: tools appear in catalog order, parameters in
    /// declaration order.
    pub fn format_reference(&self) -> String {
        let mut out = String::new();
        for (i, spec) in self.specs.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "### {}", spec.name);
            let _ = writeln!(out, "{}", spec.description);
            if spec.parameters.is_empty() {
                let _ = writeln!(out, "Parameters: none");
                continue;
            }
            let _ = writeln!(out, "Parameters:");
            for param in &spec.parameters {
                let tag = if param.required { "required" } else { "optional" };
                let _ = write!(
                    out,
                    "- `{}` ({}, {}): {}",
                    param.name,
                    param.param_type.as_str(),
                    tag,
                    param.description
                );
                if let Some(allowed) = &param.allowed {
                    let _ = write!(out, " one of: {}", allowed.join(", "));
                }
                out.push('\n');
            }
        }
        out
    }
}

fn builtin_specs() -> Vec<ToolSpec> {
    use ParamType::{Number, String};

    vec![
        ToolSpec::new(WEB_SEARCH, "Search the web and return result titles, URLs and snippets.")
            .param(ToolParameter::required("query", String, "The search query"))
            .param(ToolParameter::optional("num_results", Number, "How many results to return (default 5, max 10)")),
        ToolSpec::new(FETCH_URL, "Fetch a web page from an allowed site and return its readable text.")
            .param(ToolParameter::required("url", String, "Absolute http(s) URL on an allowlisted host")),
        ToolSpec::new(SEARCH_ARXIV, "Search arXiv for research papers.")
            .param(ToolParameter::required("query", String, "Search terms"))
            .param(ToolParameter::optional("max_results", Number, "How many papers to return (default 5, max 20)")),
        ToolSpec::new(GET_TIME, "Get the current date and time.")
            .param(ToolParameter::optional("timezone", String, "IANA timezone name, e.g. Asia/Tokyo (default UTC)")),
        ToolSpec::new(CALCULATE, "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, pi and e.")
            .param(ToolParameter::required("expression", String, "The expression, e.g. (2 + 3) * 4")),
        ToolSpec::new(WIKIPEDIA_SUMMARY, "Get the summary paragraph of an English Wikipedia article.")
            .param(ToolParameter::required("topic", String, "Article title or topic")),
        ToolSpec::new(THINK, "Write down intermediate reasoning. Has no side effects.")
            .param(ToolParameter::required("thought", String, "Your reasoning")),
        ToolSpec::new(GENERATE_IMAGE, "Generate an image from a text description.")
            .param(ToolParameter::required("prompt", String, "What the image should show"))
            .param(ToolParameter::optional("negative_prompt", String, "What the image should avoid"))
            .param(ToolParameter::optional("style", String, "Visual style").one_of(IMAGE_STYLES)),
        ToolSpec::new(REMEMBER, "Store a durable fact about the user for future conversations.")
            .param(ToolParameter::required("fact", String, "The fact, as a full sentence"))
            .param(ToolParameter::optional("category", String, "Fact category").one_of(FACT_CATEGORIES)),
        ToolSpec::new(RECALL, "Search remembered facts about the user.")
            .param(ToolParameter::required("query", String, "What to look for")),
    ]
}
