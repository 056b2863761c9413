//! Tool dispatch: lookup, validation, policy, and bounded execution.
//!
//! Every failure becomes a failed [`ToolResult`]; nothing here returns an
//! error to the agent loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rookery_core::error::ToolError;
use rookery_core::event::{DomainEvent, EventBus};
use rookery_core::tool::{ToolCall, ToolContext, ToolHandler, ToolOutput, ToolResult};
use rookery_security::HostAllowlist;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::{FETCH_URL, ToolRegistry};

/// Default upper bound for one tool execution.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs tool calls against the catalog and the attached handlers.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    allowlist: Arc<HostAllowlist>,
    timeout: Duration,
    events: Option<Arc<EventBus>>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, allowlist: Arc<HostAllowlist>) -> Self {
        Self {
            registry,
            handlers: HashMap::new(),
            allowlist,
            timeout: DEFAULT_TOOL_TIMEOUT,
            events: None,
        }
    }

    /// Attach an implementation under its catalog name.
    pub fn with_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(handler.name().to_string(), handler);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a catalog tool has an implementation attached.
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Execute one call. Never fails; errors are reported in the result.
    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let started = Instant::now();
        let outcome = self.run(call, ctx, cancel).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(output) => {
                debug!(tool = %call.name, duration_ms, "Tool succeeded");
                ToolResult::ok(output)
            }
            Err(e) => {
                warn!(tool = %call.name, duration_ms, error = %e, "Tool failed");
                ToolResult::failure(&e)
            }
        };

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                conversation_id: ctx.conversation_id.clone(),
                tool_name: call.name.clone(),
                success: result.success,
                duration_ms,
                timestamp: Utc::now(),
            });
        }
        result
    }

    async fn run(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let spec = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        spec.validate(&call.arguments)?;

        if spec.name == FETCH_URL {
            self.allowlist.check(call.str_arg("url").unwrap_or_default())?;
        }

        let handler = self
            .handlers
            .get(&spec.name)
            .cloned()
            .ok_or_else(|| ToolError::Unavailable(spec.name.clone()))?;

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let arguments = call.arguments.clone();
        let tool_ctx = ctx.clone();
        let mut task = tokio::spawn(async move { handler.call(arguments, tool_ctx).await });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(ToolError::failed(
                    &spec.name,
                    format!("tool panicked: {}", panic_message(e.into_panic())),
                )),
                Err(_) => Err(ToolError::Cancelled),
            },
            _ = tokio::time::sleep(self.timeout) => {
                task.abort();
                Err(ToolError::Timeout {
                    tool_name: spec.name.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            _ = cancel.cancelled() => {
                task.abort();
                Err(ToolError::Cancelled)
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rookery_core::tool::ToolArguments;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts calls and echoes the `text` argument.
    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        async fn call(&self, arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::text(format!("{arguments:?}")))
        }
    }

    struct Sleeper {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ToolHandler for Sleeper {
        fn name(&self) -> &str {
            "think"
        }
        async fn call(&self, _arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(ToolOutput::text("done"))
        }
    }

    struct Panicker;

    #[async_trait]
    impl ToolHandler for Panicker {
        fn name(&self) -> &str {
            "calculate"
        }
        async fn call(&self, _arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
            panic!("boom");
        }
    }

    fn executor() -> ToolExecutor {
        ToolExecutor::new(
            Arc::new(ToolRegistry::builtin()),
            Arc::new(HostAllowlist::new(["en.wikipedia.org"])),
        )
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new(name, args.as_object().cloned().unwrap_or_default())
    }

    async fn run(executor: &ToolExecutor, call: &ToolCall) -> ToolResult {
        executor
            .execute(call, &ToolContext::default(), &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let result = run(&executor(), &call("shell", json!({"cmd": "ls"}))).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unknown tool"));
    }

    #[tokio::test]
    async fn successful_call_returns_output() {
        let recorder = Arc::new(Recorder { name: "think", ..Default::default() });
        let executor = executor().with_handler(recorder.clone());
        let result = run(&executor, &call("think", json!({"thought": "hmm"}))).await;
        assert!(result.success, "{result:?}");
        assert!(result.result.unwrap().contains("hmm"));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_handler() {
        let recorder = Arc::new(Recorder { name: "generate_image", ..Default::default() });
        let executor = executor().with_handler(recorder.clone());

        let missing = run(&executor, &call("generate_image", json!({"style": "photo"}))).await;
        assert!(missing.error.unwrap().contains("missing required parameter 'prompt'"));

        let wrong_type = run(&executor, &call("generate_image", json!({"prompt": 5}))).await;
        assert!(wrong_type.error.unwrap().contains("prompt"));

        let bad_enum = run(&executor, &call("generate_image", json!({"prompt": "x", "style": "cubist"}))).await;
        assert!(bad_enum.error.unwrap().contains("cubist"));

        let extra = run(&executor, &call("generate_image", json!({"prompt": "x", "seed": 1}))).await;
        assert!(extra.error.unwrap().contains("seed"));

        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disallowed_host_blocks_before_dispatch() {
        let recorder = Arc::new(Recorder { name: "fetch_url", ..Default::default() });
        let executor = executor().with_handler(recorder.clone());

        let result = run(&executor, &call("fetch_url", json!({"url": "https://evil.example.com/x"}))).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("evil.example.com"));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);

        let allowed = run(&executor, &call("fetch_url", json!({"url": "https://en.wikipedia.org/wiki/Tokyo"}))).await;
        assert!(allowed.success);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out_and_is_abandoned() {
        let finished = Arc::new(AtomicBool::new(false));
        let executor = executor()
            .with_handler(Arc::new(Sleeper { finished: finished.clone() }))
            .with_timeout(Duration::from_secs(30));

        let result = run(&executor, &call("think", json!({"thought": "slow"}))).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timed out"));

        // The aborted task never completes its side effect.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_aborts_tool() {
        let finished = Arc::new(AtomicBool::new(false));
        let executor = executor().with_handler(Arc::new(Sleeper { finished: finished.clone() }));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = executor
            .execute(&call("think", json!({"thought": "x"})), &ToolContext::default(), &cancel)
            .await;
        assert_eq!(result.error.as_deref(), Some("cancelled"));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_tool_becomes_failed_result() {
        let executor = executor().with_handler(Arc::new(Panicker));
        let result = run(&executor, &call("calculate", json!({"expression": "1"}))).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("tool panicked: boom"));
    }

    #[tokio::test]
    async fn registered_tool_without_handler_is_unavailable() {
        let result = run(&executor(), &call("recall", json!({"query": "x"}))).await;
        assert_eq!(result.error.as_deref(), Some("tool unavailable: recall"));
    }

    #[tokio::test]
    async fn execution_publishes_event() {
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let executor = executor().with_events(events);

        run(&executor, &call("nope", json!({}))).await;
        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "nope");
                assert!(!success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
