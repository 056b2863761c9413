//! Conversation turns, sessions, and the persistence contract for them.
//!
//! These are the value objects that flow through the whole system:
//! user sends a query → orchestrator loads the session → agent loop produces
//! tool and assistant turns → orchestrator appends them back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConversationError;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// A tool execution result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
            Role::Tool => f.write_str("tool"),
        }
    }
}

/// A single immutable turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Unique turn ID
    pub id: String,

    /// Who produced this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the turn was produced
    pub timestamp: DateTime<Utc>,

    /// True for summary turns written by the session summarizer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl ConversationTurn {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            synthetic: false,
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a tool result turn.
    pub fn tool(content: impl Into<String>) -> Self {
        Self::with_role(Role::Tool, content)
    }

    /// Create a synthetic summary turn.
    pub fn summary(content: impl Into<String>) -> Self {
        Self {
            synthetic: true,
            ..Self::with_role(Role::Assistant, content)
        }
    }
}

/// An ordered history of turns for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Conversation ID (chosen by the caller, e.g. a chat channel id)
    pub id: String,

    /// The user whose memory summaries of this session are filed under
    pub owner_id: String,

    /// Turns in insertion order
    pub turns: Vec<ConversationTurn>,

    /// When the session was last compacted by the summarizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_summarized_at: Option<DateTime<Utc>>,

    /// When this session was created
    pub created_at: DateTime<Utc>,
}

impl ConversationSession {
    /// Create a new empty session.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            turns: Vec::new(),
            last_summarized_at: None,
            created_at: Utc::now(),
        }
    }

    /// Append turns in order, rejecting any whose id is already present.
    ///
    /// The check runs before any mutation, so a rejected batch leaves the
    /// session untouched.
    pub fn append(&mut self, turns: Vec<ConversationTurn>) -> Result<(), ConversationError> {
        let mut seen: std::collections::HashSet<&str> =
            self.turns.iter().map(|t| t.id.as_str()).collect();
        for turn in &turns {
            if !seen.insert(turn.id.as_str()) {
                return Err(ConversationError::DuplicateTurn {
                    session_id: self.id.clone(),
                    turn_id: turn.id.clone(),
                });
            }
        }
        self.turns.extend(turns);
        Ok(())
    }

    /// Replace the oldest `prefix_ids.len()` turns with a single summary turn.
    ///
    /// Fails with [`ConversationError::CompactionConflict`] when the current
    /// prefix no longer matches `prefix_ids`.
    pub fn compact(
        &mut self,
        prefix_ids: &[String],
        summary: ConversationTurn,
    ) -> Result<(), ConversationError> {
        let matches = self.turns.len() >= prefix_ids.len()
            && self
                .turns
                .iter()
                .zip(prefix_ids)
                .all(|(turn, id)| &turn.id == id);
        if !matches || prefix_ids.is_empty() {
            return Err(ConversationError::CompactionConflict(self.id.clone()));
        }
        self.turns.splice(0..prefix_ids.len(), std::iter::once(summary));
        self.last_summarized_at = Some(Utc::now());
        Ok(())
    }
}

/// Persistence for conversation sessions.
///
/// Implementations: in-memory (tests, ephemeral), SQLite.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "sqlite").
    fn name(&self) -> &str;

    /// Load a session, or `None` if it was never created.
    async fn load(&self, session_id: &str) -> Result<Option<ConversationSession>, ConversationError>;

    /// Load a session, creating an empty one for `owner_id` if absent.
    async fn load_or_create(
        &self,
        session_id: &str,
        owner_id: &str,
    ) -> Result<ConversationSession, ConversationError>;

    /// Append turns to the end of a session. Returns the new turn count.
    async fn append(
        &self,
        session_id: &str,
        owner_id: &str,
        turns: Vec<ConversationTurn>,
    ) -> Result<usize, ConversationError>;

    /// Current ordered history.
    async fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>, ConversationError> {
        Ok(self
            .load(session_id)
            .await?
            .map(|s| s.turns)
            .unwrap_or_default())
    }

    /// Replace the session prefix identified by `prefix_ids` with `summary`.
    async fn compact(
        &self,
        session_id: &str,
        prefix_ids: &[String],
        summary: ConversationTurn,
    ) -> Result<(), ConversationError>;
}
