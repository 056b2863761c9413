//! The bounded model ↔ tool loop.
//!
//! ```text
//! AwaitingModel ──parse──▶ ExecutingTool ──▶ AwaitingModel
//!       │                                        │ (iteration cap)
//!       │ no tool call                           ▼
//!       └──────────────▶ Done ◀──────────── Finalizing
//! any model failure ──▶ Failed
//! ```
//!
//! Tool failures are data: they are recorded in the transcript and the
//! model continues. Only a failed, timed-out or cancelled model call ends
//! the run early, and even then the caller gets an answer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rookery_config::AgentConfig;
use rookery_core::error::ProviderError;
use rookery_core::event::{DomainEvent, EventBus};
use rookery_core::memory::ScoredFact;
use rookery_core::message::ConversationTurn;
use rookery_core::provider::{CompletionRequest, CompletionService, PromptMessage};
use rookery_core::tool::{ToolCall, ToolContext, ToolResult};
use rookery_tools::ToolExecutor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::parser::ResponseParser;
use crate::prompt::{PromptBuilder, format_tool_result};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    AwaitingModel,
    ExecutingTool,
    Finalizing,
    Done,
    Failed,
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Done | LoopPhase::Failed)
    }
}

/// Mutable state of one run. Created per query and dropped afterwards.
#[derive(Debug, Clone)]
pub struct AgentRunState {
    /// Model calls made in the tool phase (the forced final call is not counted)
    pub iteration: u32,
    pub phase: LoopPhase,
    /// New turns produced by this run, in order, starting with the user query
    pub transcript: Vec<ConversationTurn>,
    pub tool_results: Vec<(ToolCall, ToolResult)>,
    /// The model text and parsed call waiting in `ExecutingTool`
    pub pending: Option<(String, ToolCall)>,
    pub finalized: bool,
    pub final_answer: Option<String>,
}

impl AgentRunState {
    fn new(query: &str) -> Self {
        Self {
            iteration: 0,
            phase: LoopPhase::AwaitingModel,
            transcript: vec![ConversationTurn::user(query)],
            tool_results: Vec::new(),
            pending: None,
            finalized: false,
            final_answer: None,
        }
    }

    /// Artifact references produced by successful tool calls, in order.
    pub fn artifacts(&self) -> Vec<String> {
        self.tool_results
            .iter()
            .filter_map(|(_, r)| r.artifact.clone())
            .collect()
    }
}

/// What a finished run hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    /// Turns to persist: the user query, each call/result pair, the answer
    pub transcript: Vec<ConversationTurn>,
    pub iterations: u32,
    pub tool_results: Vec<(ToolCall, ToolResult)>,
    pub artifacts: Vec<String>,
    pub finalized: bool,
    pub failed: bool,
}

/// Limits and sampling settings for a run.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub model_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for LoopSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            model_timeout: config.model_timeout(),
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
        }
    }
}

/// Everything a run reads but does not own.
#[derive(Debug, Clone, Copy)]
pub struct RunInput<'a> {
    pub conversation_id: &'a str,
    pub owner_id: &'a str,
    pub query: &'a str,
    pub history: &'a [ConversationTurn],
    pub facts: &'a [ScoredFact],
}

/// Drives one query through the model and tool executor.
pub struct AgentLoop {
    completion: Arc<dyn CompletionService>,
    executor: Arc<ToolExecutor>,
    parser: ResponseParser,
    prompts: PromptBuilder,
    settings: LoopSettings,
    events: Option<Arc<EventBus>>,
}

impl AgentLoop {
    pub fn new(completion: Arc<dyn CompletionService>, executor: Arc<ToolExecutor>) -> Self {
        let prompts = PromptBuilder::new(executor.registry().format_reference());
        Self {
            completion,
            executor,
            parser: ResponseParser::new(),
            prompts,
            settings: LoopSettings::default(),
            events: None,
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.prompts = self.prompts.with_persona(persona);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run to a terminal state. Always produces an answer.
    pub async fn run(&self, input: RunInput<'_>, cancel: &CancellationToken) -> AgentOutcome {
        info!(
            conversation_id = input.conversation_id,
            history = input.history.len(),
            facts = input.facts.len(),
            "Agent run started"
        );

        let mut state = AgentRunState::new(input.query);
        let ctx = ToolContext {
            owner_id: input.owner_id.to_string(),
            conversation_id: input.conversation_id.to_string(),
        };
        let system = self.prompts.system_prompt(input.facts);

        while !state.phase.is_terminal() {
            let phase = state.phase;
            state.phase = match phase {
                LoopPhase::AwaitingModel => self.await_model(&mut state, &input, &system, cancel).await,
                LoopPhase::ExecutingTool => self.execute_pending(&mut state, &ctx, cancel).await,
                LoopPhase::Finalizing => self.finalize(&mut state, &input, cancel).await,
                LoopPhase::Done | LoopPhase::Failed => phase,
            };
        }

        let failed = state.phase == LoopPhase::Failed;
        let answer = state.final_answer.clone().unwrap_or_default();
        state.transcript.push(ConversationTurn::assistant(answer.clone()));

        info!(
            conversation_id = input.conversation_id,
            iterations = state.iteration,
            tools = state.tool_results.len(),
            failed,
            "Agent run finished"
        );
        self.publish(DomainEvent::RunFinished {
            conversation_id: input.conversation_id.to_string(),
            iterations: state.iteration,
            failed,
            timestamp: Utc::now(),
        });

        let artifacts = state.artifacts();
        AgentOutcome {
            answer,
            transcript: state.transcript,
            iterations: state.iteration,
            finalized: state.finalized,
            tool_results: state.tool_results,
            artifacts,
            failed,
        }
    }

    /// Call the model and decide what comes next.
    async fn await_model(
        &self,
        state: &mut AgentRunState,
        input: &RunInput<'_>,
        system: &str,
        cancel: &CancellationToken,
    ) -> LoopPhase {
        if state.iteration >= self.settings.max_iterations {
            warn!(
                conversation_id = input.conversation_id,
                iteration = state.iteration,
                "Iteration cap reached, forcing final answer"
            );
            return LoopPhase::Finalizing;
        }
        state.iteration += 1;
        debug!(conversation_id = input.conversation_id, iteration = state.iteration, "Agent loop iteration");

        let messages = PromptBuilder::messages(input.history, &state.transcript);
        let text = match self.call_model(system.to_string(), messages, state.iteration, input, cancel).await {
            Ok(text) => text,
            Err(e) => return fail(state, input, &e),
        };

        match self.parser.parse(&text) {
            Some(call) => {
                state.pending = Some((text, call));
                LoopPhase::ExecutingTool
            }
            None => {
                state.final_answer = Some(text.trim().to_string());
                LoopPhase::Done
            }
        }
    }

    /// Run the parsed call and record both sides of it.
    async fn execute_pending(
        &self,
        state: &mut AgentRunState,
        ctx: &ToolContext,
        cancel: &CancellationToken,
    ) -> LoopPhase {
        let Some((text, call)) = state.pending.take() else {
            return LoopPhase::AwaitingModel;
        };
        debug!(conversation_id = %ctx.conversation_id, tool = %call.name, "Executing tool");
        let result = self.executor.execute(&call, ctx, cancel).await;

        state.transcript.push(ConversationTurn::assistant(text));
        state.transcript.push(ConversationTurn::tool(format_tool_result(&call, &result)));
        state.tool_results.push((call, result));
        LoopPhase::AwaitingModel
    }

    /// The forced final answer after the iteration cap.
    async fn finalize(
        &self,
        state: &mut AgentRunState,
        input: &RunInput<'_>,
        cancel: &CancellationToken,
    ) -> LoopPhase {
        state.finalized = true;
        let system = self.prompts.finalize_prompt(input.facts);
        let messages = PromptBuilder::finalize_messages(input.history, &state.transcript);
        let iteration = state.iteration + 1;

        let text = match self.call_model(system, messages, iteration, input, cancel).await {
            Ok(text) => text,
            Err(e) => return fail(state, input, &e),
        };

        if self.parser.parse(&text).is_some() {
            warn!(
                conversation_id = input.conversation_id,
                "Model requested a tool after the cap; synthesizing answer"
            );
            state.final_answer = Some(fallback_answer(&state.tool_results));
        } else {
            state.final_answer = Some(text.trim().to_string());
        }
        LoopPhase::Done
    }

    async fn call_model(
        &self,
        system: String,
        messages: Vec<PromptMessage>,
        iteration: u32,
        input: &RunInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let request = CompletionRequest {
            system,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let timeout = self.settings.model_timeout;
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            completed = tokio::time::timeout(timeout, self.completion.complete(request)) => match completed {
                Ok(result) => result.map(|c| c.text),
                Err(_) => Err(ProviderError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            conversation_id = input.conversation_id,
            iteration,
            duration_ms,
            success = result.is_ok(),
            "Model call finished"
        );
        self.publish(DomainEvent::ModelCalled {
            conversation_id: input.conversation_id.to_string(),
            iteration,
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });
        result
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

fn fail(state: &mut AgentRunState, input: &RunInput<'_>, error: &ProviderError) -> LoopPhase {
    warn!(
        conversation_id = input.conversation_id,
        iteration = state.iteration,
        error = %error,
        "Model call failed, aborting run"
    );
    state.final_answer = Some(apology(error));
    LoopPhase::Failed
}

/// The degraded answer for a run that lost its model.
pub fn apology(error: &ProviderError) -> String {
    let reason = match error {
        ProviderError::Timeout { .. } => "the language model took too long to respond",
        ProviderError::Cancelled => "the request was cancelled",
        ProviderError::RateLimited { .. } => "the language model is rate limiting requests",
        ProviderError::AuthenticationFailed(_) | ProviderError::NotConfigured(_) => {
            "the language model is not configured correctly"
        }
        _ => "the language model is unavailable",
    };
    format!("Sorry, I couldn't complete your request because {reason}. Please try again in a moment.")
}

/// An answer assembled from tool output when the model will not stop
/// asking for tools.
fn fallback_answer(results: &[(ToolCall, ToolResult)]) -> String {
    let gathered: Vec<String> = results
        .iter()
        .filter(|(_, r)| r.success)
        .rev()
        .take(3)
        .filter_map(|(call, r)| r.result.as_ref().map(|text| format!("From {}:\n{}", call.name, text.trim())))
        .collect();

    if gathered.is_empty() {
        return "I wasn't able to find an answer within the allowed number of steps.".into();
    }
    let mut answer = String::from("I ran out of steps before finishing. Here is what I found:\n\n");
    answer.push_str(&gathered.into_iter().rev().collect::<Vec<_>>().join("\n\n"));
    answer
}
