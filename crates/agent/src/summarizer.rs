//! Background compaction of long conversation sessions.
//!
//! When a session grows past the threshold, everything but the most recent
//! turns is condensed into one synthetic summary turn. The summary is also
//! filed as a memory fact for the session's owner.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rookery_config::{AgentConfig, SessionConfig};
use rookery_core::error::ConversationError;
use rookery_core::event::{DomainEvent, EventBus};
use rookery_core::message::{ConversationStore, ConversationTurn};
use rookery_core::provider::{CompletionRequest, CompletionService, PromptMessage};
use rookery_core::sync::KeyedLocks;
use rookery_memory::MemoryManager;
use tracing::{debug, info, warn};

const SUMMARY_PREFIX: &str = "Summary of earlier conversation:";
const DIGEST_LINE_CHARS: usize = 160;
const DIGEST_MAX_CHARS: usize = 2000;

const SUMMARY_SYSTEM: &str = "You condense conversations. Write a short factual summary of the \
conversation below. Keep names, preferences, decisions and unanswered questions. Do not add \
anything that was not said. Reply with the summary only.";

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    /// Compact once a session holds more than this many turns
    pub threshold: usize,
    /// Turns left untouched at the end of the session
    pub keep_recent: usize,
    pub model_timeout: Duration,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self::new(&SessionConfig::default(), &AgentConfig::default())
    }
}

impl SummarizerSettings {
    pub fn new(session: &SessionConfig, agent: &AgentConfig) -> Self {
        Self {
            threshold: session.summarize_threshold,
            keep_recent: session.keep_recent,
            model_timeout: agent.model_timeout(),
        }
    }
}

/// What one compaction did.
#[derive(Debug, Clone)]
pub struct SummaryReport {
    pub turns_compacted: usize,
    /// The memory fact holding the summary, if storing it succeeded
    pub fact_id: Option<String>,
    /// Whether the model wrote the summary (otherwise it is an extractive digest)
    pub model_written: bool,
}

pub struct SessionSummarizer {
    store: Arc<dyn ConversationStore>,
    memory: Arc<MemoryManager>,
    completion: Arc<dyn CompletionService>,
    settings: SummarizerSettings,
    locks: KeyedLocks,
    events: Option<Arc<EventBus>>,
}

impl SessionSummarizer {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        memory: Arc<MemoryManager>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            store,
            memory,
            completion,
            settings: SummarizerSettings::default(),
            locks: KeyedLocks::new(),
            events: None,
        }
    }

    pub fn with_settings(mut self, settings: SummarizerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &SummarizerSettings {
        &self.settings
    }

    /// Whether a session of `turn_count` turns should be compacted.
    pub fn needs_summary(&self, turn_count: usize) -> bool {
        turn_count > self.settings.threshold
    }

    /// Compact `session_id` if it is over the threshold.
    ///
    /// Runs at most once at a time per session. A caller that waited for the
    /// lock re-checks the size, so a burst of triggers compacts once.
    pub async fn summarize_if_needed(
        &self,
        session_id: &str,
    ) -> Result<Option<SummaryReport>, ConversationError> {
        let _guard = self.locks.lock(session_id).await;

        let Some(session) = self.store.load(session_id).await? else {
            return Ok(None);
        };
        if !self.needs_summary(session.turns.len()) {
            debug!(conversation_id = session_id, turns = session.turns.len(), "Session under threshold");
            return Ok(None);
        }

        let cut = session.turns.len().saturating_sub(self.settings.keep_recent);
        let block = &session.turns[..cut];
        if block.len() < 2 {
            return Ok(None);
        }

        let (body, model_written) = match self.model_summary(block).await {
            Some(text) => (text, true),
            None => (extractive_digest(block), false),
        };

        let fact_id = match self.memory.remember(&session.owner_id, &body, None).await {
            Ok(fact) => Some(fact.id),
            Err(e) => {
                warn!(conversation_id = session_id, error = %e, "Could not store session summary as memory");
                None
            }
        };

        let prefix_ids: Vec<String> = block.iter().map(|t| t.id.clone()).collect();
        let summary = ConversationTurn::summary(format!("{SUMMARY_PREFIX}\n{body}"));
        self.store.compact(session_id, &prefix_ids, summary).await?;

        info!(
            conversation_id = session_id,
            turns_compacted = prefix_ids.len(),
            model_written,
            "Session summarized"
        );
        if let Some(events) = &self.events {
            events.publish(DomainEvent::SessionSummarized {
                conversation_id: session_id.to_string(),
                turns_compacted: prefix_ids.len(),
                timestamp: Utc::now(),
            });
        }

        Ok(Some(SummaryReport {
            turns_compacted: prefix_ids.len(),
            fact_id,
            model_written,
        }))
    }

    /// A model-written summary, or `None` on failure, timeout or an empty reply.
    async fn model_summary(&self, block: &[ConversationTurn]) -> Option<String> {
        let transcript = block
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut request = CompletionRequest::new(
            SUMMARY_SYSTEM,
            vec![PromptMessage::new(rookery_core::message::Role::User, transcript)],
        );
        request.temperature = 0.2;

        match tokio::time::timeout(self.settings.model_timeout, self.completion.complete(request)).await {
            Ok(Ok(completion)) if !completion.text.trim().is_empty() => Some(completion.text.trim().to_string()),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(error = %e, "Summary model call failed, using digest");
                None
            }
            Err(_) => {
                warn!("Summary model call timed out, using digest");
                None
            }
        }
    }
}

/// A deterministic digest: one clipped line per turn, bounded overall.
pub fn extractive_digest(turns: &[ConversationTurn]) -> String {
    let mut digest = String::new();
    for turn in turns {
        let content = turn
            .content
            .strip_prefix(SUMMARY_PREFIX)
            .unwrap_or(&turn.content)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if content.is_empty() {
            continue;
        }
        let mut line: String = content.chars().take(DIGEST_LINE_CHARS).collect();
        if content.chars().count() > DIGEST_LINE_CHARS {
            line.push_str("...");
        }
        let line = format!("- {}: {}\n", turn.role, line);
        if digest.chars().count() + line.chars().count() > DIGEST_MAX_CHARS {
            digest.push_str("- ...\n");
            break;
        }
        digest.push_str(&line);
    }
    digest.trim_end().to_string()
}
