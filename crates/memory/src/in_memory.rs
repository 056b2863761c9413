//! In-memory stores, useful for testing and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rookery_core::error::{ConversationError, MemoryError};
use rookery_core::memory::{FactMetadata, MemoryFact, ScoredFact, VectorStore};
use rookery_core::message::{ConversationSession, ConversationStore, ConversationTurn};
use tokio::sync::RwLock;

use crate::vector::rank_facts;

/// Facts keyed by owner, each owner's list in insertion order.
#[derive(Default)]
pub struct InMemoryVectorStore {
    facts: Arc<RwLock<HashMap<String, Vec<MemoryFact>>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn upsert(
        &self,
        owner: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: FactMetadata,
    ) -> Result<(), MemoryError> {
        let mut facts = self.facts.write().await;
        let owned = facts.entry(owner.to_string()).or_default();
        if owned.iter().any(|f| f.id == id) {
            return Err(MemoryError::Duplicate {
                owner: owner.into(),
                id: id.into(),
            });
        }
        owned.push(MemoryFact {
            id: id.into(),
            owner_id: owner.into(),
            text: metadata.text,
            category: metadata.category,
            created_at: metadata.created_at,
            embedding: vector,
        });
        Ok(())
    }

    async fn query(&self, owner: &str, vector: &[f32], k: usize) -> Result<Vec<ScoredFact>, MemoryError> {
        let facts = self.facts.read().await;
        let owned = facts.get(owner).cloned().unwrap_or_default();
        Ok(rank_facts(owned, vector, k))
    }

    async fn list(&self, owner: &str) -> Result<Vec<MemoryFact>, MemoryError> {
        let facts = self.facts.read().await;
        let mut owned = facts.get(owner).cloned().unwrap_or_default();
        owned.sort_by_key(|f| f.created_at);
        Ok(owned)
    }

    async fn count(&self, owner: &str) -> Result<usize, MemoryError> {
        Ok(self.facts.read().await.get(owner).map_or(0, Vec::len))
    }
}

/// Sessions held in a map; lost on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: Arc<RwLock<HashMap<String, ConversationSession>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, session_id: &str) -> Result<Option<ConversationSession>, ConversationError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn load_or_create(
        &self,
        session_id: &str,
        owner_id: &str,
    ) -> Result<ConversationSession, ConversationError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .entry(session_id.to_string())
            .or_insert_with(|| ConversationSession::new(session_id, owner_id))
            .clone())
    }

    async fn append(
        &self,
        session_id: &str,
        owner_id: &str,
        turns: Vec<ConversationTurn>,
    ) -> Result<usize, ConversationError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| ConversationSession::new(session_id, owner_id));
        session.append(turns)?;
        Ok(session.turns.len())
    }

    async fn compact(
        &self,
        session_id: &str,
        prefix_ids: &[String],
        summary: ConversationTurn,
    ) -> Result<(), ConversationError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ConversationError::SessionNotFound(session_id.into()))?;
        session.compact(prefix_ids, summary)
    }
}
