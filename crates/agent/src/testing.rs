//! Scripted collaborators for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rookery_core::error::ProviderError;
use rookery_core::provider::{Completion, CompletionRequest, CompletionService, ImageRequest, ImageService};

/// One scripted completion behaviour.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(ProviderError),
    /// Never resolves; exercises the model timeout.
    Hang,
}

/// A completion service that plays back a script, one entry per call.
///
/// When the script runs out, `fallback` is returned (if set) or the call
/// fails with `InvalidResponse`.
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A script of plain replies.
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Scripted::Reply(r.into())))
    }

    /// Reply with `text` forever.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new([]).with_fallback(text)
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());

        let text = match next {
            Some(Scripted::Reply(text)) => text,
            Some(Scripted::Fail(error)) => return Err(error),
            Some(Scripted::Hang) => std::future::pending().await,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into()))?,
        };
        Ok(Completion {
            text,
            model: "scripted".into(),
        })
    }
}

/// An image service that returns a fixed artifact and records prompts.
pub struct StaticImageService {
    artifact: String,
    prompts: Mutex<Vec<ImageRequest>>,
}

impl StaticImageService {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ImageRequest> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageService for StaticImageService {
    fn name(&self) -> &str {
        "static"
    }

    async fn generate(&self, request: ImageRequest) -> Result<String, ProviderError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request);
        }
        Ok(self.artifact.clone())
    }
}
