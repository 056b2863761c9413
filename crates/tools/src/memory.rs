//! `remember` and `recall`: the per-user fact store, scoped to the run's owner.

use std::sync::Arc;

use async_trait::async_trait;
use rookery_core::error::ToolError;
use rookery_core::memory::FactCategory;
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};
use rookery_memory::MemoryManager;

use crate::registry::{RECALL, REMEMBER};
use crate::{optional_str, required_str};

fn require_owner<'a>(tool: &str, ctx: &'a ToolContext) -> Result<&'a str, ToolError> {
    let owner = ctx.owner_id.trim();
    if owner.is_empty() {
        return Err(ToolError::failed(tool, "no user is associated with this conversation"));
    }
    Ok(owner)
}

pub struct RememberTool {
    memory: Arc<MemoryManager>,
}

impl RememberTool {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl ToolHandler for RememberTool {
    fn name(&self) -> &str {
        REMEMBER
    }

    async fn call(&self, arguments: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let owner = require_owner(REMEMBER, &ctx)?;
        let text = required_str(&arguments, REMEMBER, "fact")?;
        let category = optional_str(&arguments, "category")
            .map(str::parse::<FactCategory>)
            .transpose()
            .map_err(|e| ToolError::failed(REMEMBER, e))?;

        let fact = self
            .memory
            .remember(owner, text, category)
            .await
            .map_err(|e| ToolError::failed(REMEMBER, e.to_string()))?;

        Ok(ToolOutput::text(format!("Remembered: {}", fact.text)))
    }
}

pub struct RecallTool {
    memory: Arc<MemoryManager>,
}

impl RecallTool {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl ToolHandler for RecallTool {
    fn name(&self) -> &str {
        RECALL
    }

    async fn call(&self, arguments: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let owner = require_owner(RECALL, &ctx)?;
        let query = required_str(&arguments, RECALL, "query")?;

        let hits = self
            .memory
            .recall(owner, query)
            .await
            .map_err(|e| ToolError::failed(RECALL, e.to_string()))?;

        if hits.is_empty() {
            return Ok(ToolOutput::text("No remembered facts match."));
        }
        let lines: Vec<String> = hits
            .iter()
            .map(|hit| match hit.fact.category {
                Some(category) => format!("- [{}] {} (score {:.2})", category.as_str(), hit.fact.text, hit.score),
                None => format!("- {} (score {:.2})", hit.fact.text, hit.score),
            })
            .collect();
        Ok(ToolOutput::text(format!("Remembered facts:\n{}", lines.join("\n"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_memory::{HashEmbedder, InMemoryVectorStore};
    use serde_json::{Value, json};

    fn memory() -> Arc<MemoryManager> {
        Arc::new(MemoryManager::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::default()),
        ))
    }

    fn ctx(owner: &str) -> ToolContext {
        ToolContext {
            owner_id: owner.into(),
            conversation_id: "c1".into(),
        }
    }

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn remember_then_recall_for_same_owner() {
        let memory = memory();
        let remember = RememberTool::new(memory.clone());
        let recall = RecallTool::new(memory.clone());

        let out = remember
            .call(args(json!({"fact": "Prefers window seats", "category": "preference"})), ctx("alice"))
            .await
            .unwrap();
        assert_eq!(out.text, "Remembered: Prefers window seats");

        let out = recall.call(args(json!({"query": "window seats"})), ctx("alice")).await.unwrap();
        assert!(out.text.contains("[preference] Prefers window seats"), "{}", out.text);

        let other = recall.call(args(json!({"query": "window seats"})), ctx("bob")).await.unwrap();
        assert_eq!(other.text, "No remembered facts match.");
    }

    #[tokio::test]
    async fn missing_owner_is_rejected() {
        let remember = RememberTool::new(memory());
        let err = remember
            .call(args(json!({"fact": "x"})), ToolContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no user is associated with this conversation");
    }

    #[tokio::test]
    async fn blank_fact_fails() {
        let memory = memory();
        let remember = RememberTool::new(memory.clone());
        assert!(remember.call(args(json!({"fact": "  "})), ctx("alice")).await.is_err());
        assert_eq!(memory.count("alice").await.unwrap(), 0);
    }
}
