//! Domain event system: decoupled observability for agent runs.
//!
//! Events are published when something interesting happens (a model call, a
//! tool execution, a compaction). Subscribers can react without coupling to
//! the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The completion service was called
    ModelCalled {
        conversation_id: String,
        iteration: u32,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed (successfully or not)
    ToolExecuted {
        conversation_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An agent run reached a terminal state
    RunFinished {
        conversation_id: String,
        iterations: u32,
        failed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A memory fact was stored
    MemoryStored {
        owner_id: String,
        fact_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A session prefix was replaced by a summary turn
    SessionSummarized {
        conversation_id: String,
        turns_compacted: usize,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short snake_case label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelCalled { .. } => "model_called",
            Self::ToolExecuted { .. } => "tool_executed",
            Self::RunFinished { .. } => "run_finished",
            Self::MemoryStored { .. } => "memory_stored",
            Self::SessionSummarized { .. } => "session_summarized",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ModelCalled { timestamp, .. }
            | Self::ToolExecuted { timestamp, .. }
            | Self::RunFinished { timestamp, .. }
            | Self::MemoryStored { timestamp, .. }
            | Self::SessionSummarized { timestamp, .. } => *timestamp,
        }
    }
}

/// Fan-out of [`DomainEvent`]s over a `tokio` broadcast channel.
///
/// Publishing never blocks and never fails; slow subscribers lag and miss
/// the oldest events once `capacity` is exceeded.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
