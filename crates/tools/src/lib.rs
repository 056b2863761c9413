//! The tool catalog, the executor, and the built-in tool implementations.
//!
//! The catalog ([`ToolRegistry`]) is fixed data; handlers are attached to a
//! [`ToolExecutor`] by name. [`default_executor`] wires every built-in tool
//! from the application config.

pub mod arxiv;
pub mod calculator;
pub mod clock;
pub mod executor;
pub mod fetch_url;
pub mod image;
pub mod memory;
pub mod registry;
pub mod think;
pub mod web_search;
pub mod wikipedia;

use std::sync::Arc;
use std::time::Duration;

use rookery_config::AppConfig;
use rookery_core::error::ToolError;
use rookery_core::event::EventBus;
use rookery_core::provider::ImageService;
use rookery_core::tool::ToolArguments;
use rookery_memory::MemoryManager;
use rookery_security::HostAllowlist;
use serde_json::Value;

pub use arxiv::ArxivSearchTool;
pub use calculator::CalculatorTool;
pub use clock::GetTimeTool;
pub use executor::{DEFAULT_TOOL_TIMEOUT, ToolExecutor};
pub use fetch_url::FetchUrlTool;
pub use image::GenerateImageTool;
pub use memory::{RecallTool, RememberTool};
pub use registry::ToolRegistry;
pub use think::ThinkTool;
pub use web_search::WebSearchTool;
pub use wikipedia::WikipediaSummaryTool;

const USER_AGENT: &str = concat!("rookery/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an executor over the built-in catalog with every handler attached.
///
/// `generate_image` is only attached when an image service is supplied;
/// without one it reports "tool unavailable".
pub fn default_executor(
    config: &AppConfig,
    memory: Arc<MemoryManager>,
    image: Option<Arc<dyn ImageService>>,
    events: Option<Arc<EventBus>>,
) -> Result<ToolExecutor, ToolError> {
    let allowlist = Arc::new(HostAllowlist::new(config.tools.fetch_allowlist.iter()));

    let mut executor = ToolExecutor::new(Arc::new(ToolRegistry::builtin()), allowlist.clone())
        .with_timeout(config.agent.tool_timeout())
        .with_handler(Arc::new(WebSearchTool::new(config.tools.search_results)?))
        .with_handler(Arc::new(FetchUrlTool::new(allowlist, config.tools.max_fetch_chars)?))
        .with_handler(Arc::new(ArxivSearchTool::new()?))
        .with_handler(Arc::new(GetTimeTool))
        .with_handler(Arc::new(CalculatorTool))
        .with_handler(Arc::new(WikipediaSummaryTool::new()?))
        .with_handler(Arc::new(ThinkTool))
        .with_handler(Arc::new(RememberTool::new(memory.clone())))
        .with_handler(Arc::new(RecallTool::new(memory)));

    if let Some(service) = image {
        executor = executor.with_handler(Arc::new(GenerateImageTool::new(service)));
    }
    if let Some(events) = events {
        executor = executor.with_events(events);
    }
    Ok(executor)
}

/// Shared HTTP client settings for the network tools.
pub(crate) fn http_client(builder: reqwest::ClientBuilder) -> Result<reqwest::Client, ToolError> {
    builder
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| ToolError::Unavailable(format!("HTTP client: {e}")))
}

/// A required string argument. The executor has already validated presence
/// and type, so a miss here only happens when a handler is called directly.
pub(crate) fn required_str<'a>(
    arguments: &'a ToolArguments,
    tool: &str,
    key: &str,
) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::failed(tool, format!("missing required parameter '{key}'")))
}

pub(crate) fn optional_str<'a>(arguments: &'a ToolArguments, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

/// An optional count argument, clamped to `1..=max`.
pub(crate) fn optional_count(arguments: &ToolArguments, key: &str, default: usize, max: usize) -> usize {
    arguments
        .get(key)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .map(|n| n.round().clamp(1.0, max as f64) as usize)
        .unwrap_or(default)
        .clamp(1, max)
}
