//! Per-request coordination: session, memory, loop, persistence,
//! summarization.

use std::sync::Arc;

use rookery_core::memory::ScoredFact;
use rookery_core::message::{ConversationStore, ConversationTurn};
use rookery_core::sync::KeyedLocks;
use rookery_memory::MemoryManager;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::loop_runner::{AgentLoop, RunInput};
use crate::summarizer::SessionSummarizer;

/// One inbound user message.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub conversation_id: String,
    pub owner_id: String,
    pub text: String,
}

impl QueryRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        owner_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            owner_id: owner_id.into(),
            text: text.into(),
        }
    }
}

/// The answer handed back to the caller.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub answer: String,
    /// Artifact references from `generate_image`, in production order
    pub artifacts: Vec<String>,
    pub iterations: u32,
    pub failed: bool,
    /// Whether the new turns reached the conversation store
    pub persisted: bool,
}

pub struct Orchestrator {
    store: Arc<dyn ConversationStore>,
    memory: Arc<MemoryManager>,
    agent: Arc<AgentLoop>,
    summarizer: Arc<SessionSummarizer>,
    locks: KeyedLocks,
    background: Mutex<JoinSet<()>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        memory: Arc<MemoryManager>,
        agent: Arc<AgentLoop>,
        summarizer: Arc<SessionSummarizer>,
    ) -> Self {
        Self {
            store,
            memory,
            agent,
            summarizer,
            locks: KeyedLocks::new(),
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Answer one query.
    ///
    /// Queries for the same conversation run one at a time in arrival order.
    /// Store and memory failures degrade the run instead of failing it.
    pub async fn handle(&self, request: QueryRequest, cancel: &CancellationToken) -> QueryResponse {
        let conversation_id = request.conversation_id.as_str();
        let _guard = self.locks.lock(conversation_id).await;

        let history = match self.store.load_or_create(conversation_id, &request.owner_id).await {
            Ok(session) => session.turns,
            Err(e) => {
                warn!(conversation_id, error = %e, "Could not load session, continuing without history");
                Vec::new()
            }
        };
        let facts = self.recall(&request).await;

        let outcome = self
            .agent
            .run(
                RunInput {
                    conversation_id,
                    owner_id: &request.owner_id,
                    query: &request.text,
                    history: &history,
                    facts: &facts,
                },
                cancel,
            )
            .await;

        let answer = with_artifacts(&outcome.answer, &outcome.artifacts);
        let persisted = self.persist(&request, outcome.transcript).await;

        info!(
            conversation_id,
            iterations = outcome.iterations,
            failed = outcome.failed,
            artifacts = outcome.artifacts.len(),
            "Query handled"
        );

        QueryResponse {
            answer,
            artifacts: outcome.artifacts,
            iterations: outcome.iterations,
            failed: outcome.failed,
            persisted,
        }
    }

    /// Wait for background summarization started by earlier queries.
    pub async fn wait_for_background(&self) {
        let mut tasks = std::mem::take(&mut *self.background.lock().await);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Background task failed");
            }
        }
    }

    /// Background tasks not yet reaped, finished or not.
    pub async fn pending_background(&self) -> usize {
        self.background.lock().await.len()
    }

    async fn recall(&self, request: &QueryRequest) -> Vec<ScoredFact> {
        match self.memory.recall(&request.owner_id, &request.text).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!(
                    conversation_id = %request.conversation_id,
                    error = %e,
                    "Memory recall failed, continuing without memory"
                );
                Vec::new()
            }
        }
    }

    /// Append the run's turns and start summarization when the session is
    /// over the threshold.
    async fn persist(&self, request: &QueryRequest, turns: Vec<ConversationTurn>) -> bool {
        let count = match self
            .store
            .append(&request.conversation_id, &request.owner_id, turns)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(conversation_id = %request.conversation_id, error = %e, "Could not persist turns");
                return false;
            }
        };

        if self.summarizer.needs_summary(count) {
            let summarizer = self.summarizer.clone();
            let session_id = request.conversation_id.clone();
            let mut tasks = self.background.lock().await;
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "Background task failed");
                }
            }
            tasks.spawn(async move {
                if let Err(e) = summarizer.summarize_if_needed(&session_id).await {
                    warn!(conversation_id = %session_id, error = %e, "Session summarization failed");
                }
            });
        }
        true
    }
}

/// Mention any artifact the answer does not already reference.
fn with_artifacts(answer: &str, artifacts: &[String]) -> String {
    let missing: Vec<&String> = artifacts.iter().filter(|a| !answer.contains(a.as_str())).collect();
    if missing.is_empty() {
        return answer.to_string();
    }
    let mut out = answer.trim_end().to_string();
    out.push_str("\n\n");
    let lines: Vec<String> = missing.iter().map(|a| format!("Generated image: {a}")).collect();
    out.push_str(&lines.join("\n"));
    out
}
