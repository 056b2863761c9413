//! # Rookery Core
//!
//! Domain types, collaborator traits, and error definitions for the Rookery
//! tool-use agent. Every other crate depends inward on this one.
//!
//! Each external collaborator (completion service, embedder, vector store,
//! image service, conversation persistence) is a trait here, with
//! implementations in `rookery-memory` and `rookery-providers`, and scripted
//! ones in `rookery-agent::testing` (behind its `testing` feature).

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod sync;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{Embedder, FactCategory, FactMetadata, MemoryFact, ScoredFact, VectorStore};
pub use message::{ConversationSession, ConversationStore, ConversationTurn, Role};
pub use provider::{
    Completion, CompletionRequest, CompletionService, ImageRequest, ImageService, PromptMessage,
};
pub use sync::KeyedLocks;
pub use tool::{
    ParamType, ToolArguments, ToolCall, ToolContext, ToolHandler, ToolOutput, ToolParameter,
    ToolResult, ToolSpec,
};
