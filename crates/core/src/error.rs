//! Error types for the Rookery domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Tool-level errors never escape the tool executor: they are rendered into a
//! failed [`ToolResult`](crate::tool::ToolResult) with the error's `Display`
//! text. Only [`ProviderError`] is fatal to an agent run.

use thiserror::Error;

/// The top-level error type for all Rookery operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Conversation errors ---
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the completion, embedding or image collaborators.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    InvalidResponse(String),
}

/// A tool call's arguments did not match the declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("parameter '{name}' must be of type {expected}, got {actual}")]
    WrongType {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("parameter '{name}' must be one of [{allowed}], got '{value}'")]
    NotInEnum {
        name: String,
        value: String,
        allowed: String,
    },

    #[error("unexpected parameter '{0}'")]
    UnknownParameter(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("unknown tool")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidParameter(#[from] ValidationError),

    #[error("host '{host}' is not in the fetch allowlist")]
    DisallowedHost { host: String },

    #[error("blocked url: {0}")]
    BlockedUrl(String),

    #[error("timed out")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("tool unavailable: {0}")]
    Unavailable(String),

    #[error("{reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

impl ToolError {
    /// Shorthand for an implementation-level failure.
    pub fn failed(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Duplicate fact '{id}' for owner '{owner}'")]
    Duplicate { owner: String, id: String },

    #[error("Fact text must not be empty")]
    EmptyFact,
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Turn {turn_id} already present in session {session_id}")]
    DuplicateTurn { session_id: String, turn_id: String },

    #[error("Compaction conflict in session {0}: prefix changed")]
    CompactionConflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
