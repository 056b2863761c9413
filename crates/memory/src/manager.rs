//! The per-owner memory facade used by tools, the orchestrator, and the
//! session summarizer.

use std::sync::Arc;

use chrono::Utc;
use rookery_core::error::MemoryError;
use rookery_core::event::{DomainEvent, EventBus};
use rookery_core::memory::{Embedder, FactCategory, FactMetadata, MemoryFact, ScoredFact, VectorStore};
use rookery_core::sync::KeyedLocks;
use tracing::{debug, info};
use uuid::Uuid;

/// Stores and recalls facts for each owner.
///
/// Writes for one owner are serialized in arrival order; reads take no lock
/// and see the store either before or after a concurrent write.
pub struct MemoryManager {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    locks: KeyedLocks,
    recall_limit: usize,
    events: Option<Arc<EventBus>>,
}

impl MemoryManager {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            locks: KeyedLocks::new(),
            recall_limit: 5,
            events: None,
        }
    }

    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit.max(1);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn recall_limit(&self) -> usize {
        self.recall_limit
    }

    /// Embed and persist a new fact for `owner`.
    pub async fn remember(
        &self,
        owner: &str,
        text: &str,
        category: Option<FactCategory>,
    ) -> Result<MemoryFact, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::EmptyFact);
        }

        let _guard = self.locks.lock(owner).await;

        let embedding = self.embedder.embed(text).await?;
        let fact = MemoryFact {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.to_string(),
            text: text.to_string(),
            category,
            created_at: Utc::now(),
            embedding,
        };

        self.store
            .upsert(
                owner,
                &fact.id,
                fact.embedding.clone(),
                FactMetadata {
                    text: fact.text.clone(),
                    category: fact.category,
                    created_at: fact.created_at,
                },
            )
            .await?;

        info!(owner, fact_id = %fact.id, backend = self.store.name(), "Fact remembered");
        if let Some(events) = &self.events {
            events.publish(DomainEvent::MemoryStored {
                owner_id: owner.to_string(),
                fact_id: fact.id.clone(),
                timestamp: fact.created_at,
            });
        }
        Ok(fact)
    }

    /// The most relevant facts for `query`, using the configured limit.
    pub async fn recall(&self, owner: &str, query: &str) -> Result<Vec<ScoredFact>, MemoryError> {
        self.recall_top(owner, query, self.recall_limit).await
    }

    /// The `k` most relevant facts for `query`, most similar first.
    pub async fn recall_top(
        &self,
        owner: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredFact>, MemoryError> {
        if k == 0 || self.store.count(owner).await? == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;
        let hits = self.store.query(owner, &vector, k).await?;
        debug!(owner, hits = hits.len(), "Recall complete");
        Ok(hits)
    }

    pub async fn count(&self, owner: &str) -> Result<usize, MemoryError> {
        self.store.count(owner).await
    }

    /// All facts for `owner`, oldest first.
    pub async fn list(&self, owner: &str) -> Result<Vec<MemoryFact>, MemoryError> {
        self.store.list(owner).await
    }
}
