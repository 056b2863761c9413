//! Memory traits: durable, per-owner facts with vector-similarity recall.
//!
//! A [`MemoryFact`] is written once (by the `remember` tool or by session
//! summarization) and never edited; newer facts supersede older ones.
//! Storage and embedding are collaborators behind [`VectorStore`] and
//! [`Embedder`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Coarse category attached to a remembered fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Preference,
    Personal,
    Work,
    Hobby,
    Other,
}

impl FactCategory {
    pub const ALL: [FactCategory; 5] = [
        FactCategory::Preference,
        FactCategory::Personal,
        FactCategory::Work,
        FactCategory::Hobby,
        FactCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactCategory::Preference => "preference",
            FactCategory::Personal => "personal",
            FactCategory::Work => "work",
            FactCategory::Hobby => "hobby",
            FactCategory::Other => "other",
        }
    }
}

impl std::str::FromStr for FactCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown fact category '{s}'"))
    }
}

/// A single remembered fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFact {
    /// Unique (per owner) fact ID
    pub id: String,

    /// The user this fact belongs to
    pub owner_id: String,

    /// The remembered text
    pub text: String,

    /// Optional category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FactCategory>,

    /// When this fact was created
    pub created_at: DateTime<Utc>,

    /// Embedding vector (stored as blob in DB)
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Everything stored alongside a vector besides the owner and id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactMetadata {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FactCategory>,
    pub created_at: DateTime<Utc>,
}

/// A fact returned from a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredFact {
    pub fact: MemoryFact,
    /// Cosine similarity to the query vector
    pub score: f32,
}

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The embedder name (e.g., "hash", "openai").
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

/// Owner-partitioned vector storage.
///
/// Implementations: in-memory (tests, ephemeral), SQLite.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "sqlite").
    fn name(&self) -> &str;

    /// Insert a vector. Fails with [`MemoryError::Duplicate`] if
    /// `(owner, id)` already exists; facts are never overwritten.
    async fn upsert(
        &self,
        owner: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: FactMetadata,
    ) -> Result<(), MemoryError>;

    /// Top-`k` facts of `owner` by similarity to `vector`, most similar first.
    async fn query(&self, owner: &str, vector: &[f32], k: usize) -> Result<Vec<ScoredFact>, MemoryError>;

    /// All facts of `owner`, oldest first.
    async fn list(&self, owner: &str) -> Result<Vec<MemoryFact>, MemoryError>;

    /// Number of facts stored for `owner`.
    async fn count(&self, owner: &str) -> Result<usize, MemoryError>;
}
