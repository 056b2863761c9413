//! The agent: response parsing, prompt assembly, the bounded tool loop,
//! session summarization, and the per-request orchestrator.
//!
//! A query flows through [`Orchestrator::handle`]:
//!
//! 1. **Load** the conversation session and recall the owner's memory facts
//! 2. **Loop** with [`AgentLoop`]: call the model, parse a tool call, run it
//!    through the executor, repeat until a plain answer or the iteration cap
//! 3. **Persist** the new turns and, past the size threshold, compact the
//!    session in the background with [`SessionSummarizer`]

pub mod loop_runner;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod summarizer;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use loop_runner::{AgentLoop, AgentOutcome, AgentRunState, LoopPhase, LoopSettings, RunInput};
pub use orchestrator::{Orchestrator, QueryRequest, QueryResponse};
pub use parser::ResponseParser;
pub use prompt::PromptBuilder;
pub use summarizer::{SessionSummarizer, SummarizerSettings, SummaryReport};
