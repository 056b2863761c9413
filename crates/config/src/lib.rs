//! Configuration loading, validation, and management for Rookery.
//!
//! Loads configuration from `~/.rookery/config.toml` with environment
//! variable overrides. Validates all settings at startup. The resulting
//! value is built once and passed explicitly into each component.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hosts `fetch_url` may contact unless the config overrides the list.
pub const DEFAULT_FETCH_ALLOWLIST: &[&str] = &[
    "en.wikipedia.org",
    "wikipedia.org",
    "arxiv.org",
    "export.arxiv.org",
    "scholar.google.com",
    "duckduckgo.com",
    "html.duckduckgo.com",
    "github.com",
    "raw.githubusercontent.com",
    "docs.rs",
    "doc.rust-lang.org",
    "developer.mozilla.org",
    "stackoverflow.com",
];

/// The root configuration structure.
///
/// Maps directly to `~/.rookery/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion/embedding endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Completion model
    #[serde(default = "default_model")]
    pub model: String,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Session compaction
    #[serde(default)]
    pub session: SessionConfig,

    /// Image generation collaborator
    #[serde(default)]
    pub image: ImageConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("memory", &self.memory)
            .field("session", &self.session)
            .field("image", &self.image)
            .finish()
    }
}

/// Hard ceiling on tool-calling iterations per query.
pub const MAX_ITERATIONS: u32 = 8;
/// Hard ceiling on one tool execution.
pub const MAX_TOOL_TIMEOUT_MS: u64 = 30_000;
/// Hard ceiling on one completion call.
pub const MAX_MODEL_TIMEOUT_MS: u64 = 120_000;

/// Bounds on a single agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool-calling iterations per query
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Upper bound for one tool execution
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Upper bound for one completion call
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Extra instructions prepended to the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

fn default_max_iterations() -> u32 {
    MAX_ITERATIONS
}
fn default_tool_timeout_ms() -> u64 {
    MAX_TOOL_TIMEOUT_MS
}
fn default_model_timeout_ms() -> u64 {
    MAX_MODEL_TIMEOUT_MS
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

impl AgentConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_ms: default_tool_timeout_ms(),
            model_timeout_ms: default_model_timeout_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            persona: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Hostnames `fetch_url` may contact
    #[serde(default = "default_fetch_allowlist")]
    pub fetch_allowlist: Vec<String>,

    /// Characters of page text returned by `fetch_url`
    #[serde(default = "default_max_fetch_chars")]
    pub max_fetch_chars: usize,

    /// Default number of `web_search` results
    #[serde(default = "default_search_results")]
    pub search_results: usize,
}

fn default_fetch_allowlist() -> Vec<String> {
    DEFAULT_FETCH_ALLOWLIST.iter().map(|h| h.to_string()).collect()
}
fn default_max_fetch_chars() -> usize {
    8_000
}
fn default_search_results() -> usize {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fetch_allowlist: default_fetch_allowlist(),
            max_fetch_chars: default_max_fetch_chars(),
            search_results: default_search_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "in_memory" or "sqlite"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite database path (ignored for in_memory)
    #[serde(default = "default_memory_path")]
    pub path: String,

    /// Facts recalled per query
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// "hash" (offline) or "remote" (OpenAI-compatible /embeddings)
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Dimensions of the hash embedder
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_memory_path() -> String {
    AppConfig::config_dir()
        .join("memory.db")
        .to_string_lossy()
        .into_owned()
}
fn default_recall_limit() -> usize {
    5
}
fn default_embedding_provider() -> String {
    "hash".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_dimensions() -> usize {
    256
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: default_memory_path(),
            recall_limit: default_recall_limit(),
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Turn count above which a session is compacted
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,

    /// Most recent turns left untouched by compaction
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
}

fn default_summarize_threshold() -> usize {
    40
}
fn default_keep_recent() -> usize {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            summarize_threshold: default_summarize_threshold(),
            keep_recent: default_keep_recent(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Text-to-image endpoint; `generate_image` is unavailable when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ImageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.rookery/config.toml).
    ///
    /// Also checks environment variables:
    /// - `ROOKERY_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `ROOKERY_API_URL`
    /// - `ROOKERY_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("ROOKERY_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        if let Ok(url) = std::env::var("ROOKERY_API_URL") {
            self.api_url = url;
        }

        if let Ok(model) = std::env::var("ROOKERY_MODEL") {
            self.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".rookery")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_ITERATIONS).contains(&self.agent.max_iterations) {
            return Err(ConfigError::ValidationError(format!(
                "agent.max_iterations must be between 1 and {MAX_ITERATIONS}, got {}",
                self.agent.max_iterations
            )));
        }

        if !(1..=MAX_TOOL_TIMEOUT_MS).contains(&self.agent.tool_timeout_ms) {
            return Err(ConfigError::ValidationError(format!(
                "agent.tool_timeout_ms must be between 1 and {MAX_TOOL_TIMEOUT_MS}, got {}",
                self.agent.tool_timeout_ms
            )));
        }

        if !(1..=MAX_MODEL_TIMEOUT_MS).contains(&self.agent.model_timeout_ms) {
            return Err(ConfigError::ValidationError(format!(
                "agent.model_timeout_ms must be between 1 and {MAX_MODEL_TIMEOUT_MS}, got {}",
                self.agent.model_timeout_ms
            )));
        }

        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.session.keep_recent >= self.session.summarize_threshold {
            return Err(ConfigError::ValidationError(
                "session.keep_recent must be smaller than session.summarize_threshold".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "in_memory" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be 'in_memory' or 'sqlite', got '{}'",
                self.memory.backend
            )));
        }

        if !matches!(self.memory.embedding_provider.as_str(), "hash" | "remote") {
            return Err(ConfigError::ValidationError(format!(
                "memory.embedding_provider must be 'hash' or 'remote', got '{}'",
                self.memory.embedding_provider
            )));
        }

        if self.memory.embedding_dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "memory.embedding_dimensions must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Render the config as TOML with secrets removed.
    pub fn to_redacted_toml(&self) -> String {
        let mut config = self.clone();
        config.api_key = None;
        config.image.api_key = None;
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
            session: SessionConfig::default(),
            image: ImageConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
