//! End-to-end runs through the orchestrator with scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rookery_agent::testing::{ScriptedCompletion, StaticImageService};
use rookery_agent::{
    AgentLoop, LoopSettings, Orchestrator, QueryRequest, SessionSummarizer, SummarizerSettings,
};
use rookery_config::AppConfig;
use rookery_core::error::{ProviderError, ToolError};
use rookery_core::message::{ConversationStore, Role};
use rookery_core::provider::{Completion, CompletionRequest, CompletionService};
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};
use rookery_memory::{HashEmbedder, InMemoryConversationStore, InMemoryVectorStore, MemoryManager};
use rookery_security::HostAllowlist;
use rookery_tools::{ThinkTool, ToolExecutor, ToolRegistry, default_executor};
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

struct Harness {
    orchestrator: Orchestrator,
    store: Arc<InMemoryConversationStore>,
    memory: Arc<MemoryManager>,
}

fn memory() -> Arc<MemoryManager> {
    Arc::new(MemoryManager::new(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(HashEmbedder::default()),
    ))
}

fn harness_with(
    completion: Arc<dyn CompletionService>,
    memory: Arc<MemoryManager>,
    executor: ToolExecutor,
    summarizer: SummarizerSettings,
) -> Harness {
    let store = Arc::new(InMemoryConversationStore::new());
    let agent = Arc::new(AgentLoop::new(completion.clone(), Arc::new(executor)));
    let summarizer = Arc::new(
        SessionSummarizer::new(store.clone(), memory.clone(), completion).with_settings(summarizer),
    );
    Harness {
        orchestrator: Orchestrator::new(store.clone(), memory.clone(), agent, summarizer),
        store,
        memory,
    }
}

fn harness(completion: Arc<dyn CompletionService>, image: Option<Arc<StaticImageService>>) -> Harness {
    let memory = memory();
    let image = image.map(|i| i as Arc<dyn rookery_core::provider::ImageService>);
    let executor = default_executor(&AppConfig::default(), memory.clone(), image, None).unwrap();
    harness_with(completion, memory, executor, SummarizerSettings::default())
}

async fn ask(harness: &Harness, conversation: &str, text: &str) -> rookery_agent::QueryResponse {
    harness
        .orchestrator
        .handle(QueryRequest::new(conversation, "alice", text), &CancellationToken::new())
        .await
}

/// Answers "reply to: <last message>", and "SUMMARY" for summarization requests.
struct EchoCompletion {
    delay: Duration,
}

#[async_trait]
impl CompletionService for EchoCompletion {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        tokio::time::sleep(self.delay).await;
        let text = if request.system.starts_with("You condense") {
            "SUMMARY".to_string()
        } else {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            format!("reply to: {last} (saw {} messages)", request.messages.len())
        };
        Ok(Completion {
            text,
            model: "echo".into(),
        })
    }
}

#[tokio::test]
async fn capital_of_japan_is_a_single_iteration() {
    let completion = Arc::new(ScriptedCompletion::replies(["The capital of Japan is Tokyo."]));
    let h = harness(completion.clone(), None);

    let response = ask(&h, "c1", "What's the capital of Japan?").await;

    assert_eq!(response.answer, "The capital of Japan is Tokyo.");
    assert_eq!(response.iterations, 1);
    assert!(!response.failed);
    assert!(response.persisted);
    assert_eq!(completion.call_count(), 1);

    let history = h.store.history("c1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].content, "The capital of Japan is Tokyo.");
}

#[tokio::test]
async fn image_request_returns_artifact() {
    let completion = Arc::new(ScriptedCompletion::replies([
        "```json\n{\"tool\": \"generate_image\", \"arguments\": {\"prompt\": \"a cat\", \"style\": \"photo\"}}\n```",
        "Here is your cat!",
    ]));
    let images = Arc::new(StaticImageService::new("https://images.example/cat.png"));
    let h = harness(completion.clone(), Some(images.clone()));

    let response = ask(&h, "c1", "generate an image of a cat").await;

    assert_eq!(images.requests().len(), 1);
    assert_eq!(images.requests()[0].prompt, "a cat");
    assert_eq!(completion.call_count(), 2);
    assert_eq!(response.artifacts, ["https://images.example/cat.png"]);
    assert!(response.answer.starts_with("Here is your cat!"));
    assert!(response.answer.contains("https://images.example/cat.png"));

    let second = &completion.requests()[1];
    assert!(second.messages.iter().any(|m| m.role == Role::Tool
        && m.content.contains("Artifact: https://images.example/cat.png")));

    let roles: Vec<Role> = h.store.history("c1").await.unwrap().iter().map(|t| t.role).collect();
    assert_eq!(roles, [Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
}

#[tokio::test]
async fn loop_never_exceeds_eight_tool_iterations() {
    let call = "{\"tool\": \"think\", \"arguments\": {\"thought\": \"one more step\"}}";
    let completion = Arc::new(ScriptedCompletion::always(call));
    let h = harness(completion.clone(), None);

    let response = ask(&h, "c1", "keep going").await;

    assert_eq!(response.iterations, 8);
    assert!(!response.failed);
    // eight tool steps plus the forced final call
    assert_eq!(completion.call_count(), 9);
    let history = h.store.history("c1").await.unwrap();
    assert_eq!(history.iter().filter(|t| t.role == Role::Tool).count(), 8);
    assert!(response.answer.contains("Noted: one more step"));
}

struct StuckSearch;

#[async_trait]
impl ToolHandler for StuckSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    async fn call(&self, _arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(ToolOutput::text("too late"))
    }
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out_and_loop_advances() {
    let completion = Arc::new(ScriptedCompletion::replies([
        "{\"tool\": \"web_search\", \"arguments\": {\"query\": \"rust\"}}",
        "Search is slow right now, but Rust is a systems language.",
    ]));
    let executor = ToolExecutor::new(Arc::new(ToolRegistry::builtin()), Arc::new(HostAllowlist::default()))
        .with_handler(Arc::new(StuckSearch))
        .with_timeout(Duration::from_millis(30_000));
    let h = harness_with(completion.clone(), memory(), executor, SummarizerSettings::default());

    let started = tokio::time::Instant::now();
    let response = ask(&h, "c1", "what is rust?").await;

    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(600));
    assert_eq!(response.iterations, 2);
    assert!(response.answer.starts_with("Search is slow"));

    let history = h.store.history("c1").await.unwrap();
    assert_eq!(history[2].content, "Tool `web_search` failed: timed out");
}

#[tokio::test]
async fn summarization_replaces_prefix_with_one_turn() {
    let completion = Arc::new(EchoCompletion { delay: Duration::ZERO });
    let executor = ToolExecutor::new(Arc::new(ToolRegistry::builtin()), Arc::new(HostAllowlist::default()))
        .with_handler(Arc::new(ThinkTool));
    let h = harness_with(
        completion,
        memory(),
        executor,
        SummarizerSettings {
            threshold: 6,
            keep_recent: 2,
            model_timeout: Duration::from_secs(120),
        },
    );

    for i in 0..4 {
        ask(&h, "c1", &format!("question {i}")).await;
    }
    h.orchestrator.wait_for_background().await;

    let history = h.store.history("c1").await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().filter(|t| t.synthetic).count(), 1);
    assert!(history[0].synthetic);
    assert!(history[0].content.contains("SUMMARY"));
    assert_eq!(history[1].content, "question 3");
    assert!(history[2].content.starts_with("reply to: question 3"));

    let facts = h.memory.list("alice").await.unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].text, "SUMMARY");

    // Nothing further to compact.
    ask(&h, "c1", "question 4").await;
    h.orchestrator.wait_for_background().await;
    assert_eq!(h.store.history("c1").await.unwrap().len(), 5);
}

#[tokio::test]
async fn finished_summaries_do_not_pile_up() {
    let completion = Arc::new(EchoCompletion { delay: Duration::ZERO });
    let executor = ToolExecutor::new(Arc::new(ToolRegistry::builtin()), Arc::new(HostAllowlist::default()))
        .with_handler(Arc::new(ThinkTool));
    let h = harness_with(
        completion,
        memory(),
        executor,
        SummarizerSettings {
            threshold: 4,
            keep_recent: 2,
            model_timeout: Duration::from_secs(120),
        },
    );

    for i in 0..20 {
        ask(&h, "c1", &format!("question {i}")).await;
        // Let the summary spawned by this turn run to completion.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.orchestrator.pending_background().await <= 1);

    h.orchestrator.wait_for_background().await;
    assert_eq!(h.orchestrator.pending_background().await, 0);
}

#[tokio::test]
async fn same_conversation_is_served_in_arrival_order() {
    let completion = Arc::new(EchoCompletion {
        delay: Duration::from_millis(5),
    });
    let h = Arc::new(harness(completion, None));

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move { ask(&h, "shared", &format!("message {i}")).await })
        })
        .collect();
    let responses: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // Each run saw every earlier exchange.
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(
            response.answer,
            format!("reply to: message {i} (saw {} messages)", 2 * i + 1)
        );
    }

    let history = h.store.history("shared").await.unwrap();
    let users: Vec<&str> = history
        .iter()
        .filter(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
        .collect();
    assert_eq!(users, ["message 0", "message 1", "message 2", "message 3", "message 4"]);
}

/// Blocks until `parties` calls are in flight at once.
struct RendezvousCompletion {
    barrier: Barrier,
}

#[async_trait]
impl CompletionService for RendezvousCompletion {
    fn name(&self) -> &str {
        "rendezvous"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.barrier.wait().await;
        Ok(Completion {
            text: "done".into(),
            model: "rendezvous".into(),
        })
    }
}

#[tokio::test]
async fn different_conversations_run_concurrently() {
    let completion = Arc::new(RendezvousCompletion {
        barrier: Barrier::new(2),
    });
    let h = Arc::new(harness(completion, None));

    let a = {
        let h = h.clone();
        tokio::spawn(async move { ask(&h, "a", "hi").await })
    };
    let b = {
        let h = h.clone();
        tokio::spawn(async move { ask(&h, "b", "hi").await })
    };

    let both = tokio::time::timeout(Duration::from_secs(5), futures::future::join(a, b)).await;
    let (a, b) = both.expect("conversations blocked each other");
    assert_eq!(a.unwrap().answer, "done");
    assert_eq!(b.unwrap().answer, "done");
}

#[tokio::test]
async fn recalled_memory_reaches_the_prompt() {
    let completion = Arc::new(ScriptedCompletion::replies(["You like green."]));
    let h = harness(completion.clone(), None);
    h.memory
        .remember("alice", "Alice's favorite color is green", None)
        .await
        .unwrap();

    ask(&h, "c1", "what is my favorite color?").await;

    let system = &completion.requests()[0].system;
    assert!(system.contains("Alice's favorite color is green"));
}

#[tokio::test]
async fn model_outage_still_answers() {
    let completion = Arc::new(ScriptedCompletion::new([rookery_agent::testing::Scripted::Fail(
        ProviderError::ApiError {
            status_code: 503,
            message: "overloaded".into(),
        },
    )]));
    let h = harness(completion, None);

    let response = ask(&h, "c1", "hello?").await;
    assert!(response.failed);
    assert!(response.answer.starts_with("Sorry"));
    assert_eq!(h.store.history("c1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn loop_settings_come_from_config() {
    let mut config = AppConfig::default();
    config.agent.max_iterations = 3;
    let settings = LoopSettings::from(&config.agent);
    assert_eq!(settings.max_iterations, 3);
    assert_eq!(settings.model_timeout, Duration::from_millis(120_000));
}
