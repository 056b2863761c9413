//! Memory and conversation persistence for Rookery.
//!
//! - [`MemoryManager`]: per-owner remembered facts with similarity recall
//! - [`HashEmbedder`]: offline, deterministic embedder
//! - [`InMemoryVectorStore`] / [`InMemoryConversationStore`]: ephemeral stores
//! - [`SqliteStore`]: durable store for both facts and sessions

pub mod embedding;
pub mod in_memory;
pub mod manager;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use embedding::HashEmbedder;
pub use in_memory::{InMemoryConversationStore, InMemoryVectorStore};
pub use manager::MemoryManager;
pub use vector::{cosine_similarity, rank_facts};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
