//! Prompt assembly for the agent loop.

use rookery_core::memory::ScoredFact;
use rookery_core::message::ConversationTurn;
use rookery_core::provider::PromptMessage;
use rookery_core::tool::{ToolCall, ToolResult};

const DEFAULT_PERSONA: &str = "You are Rookery, a helpful assistant. Answer accurately and concisely.";

const TOOL_PROTOCOL: &str = "\
## Using tools
To use a tool, reply with ONLY a JSON object in a ```json fenced block:
```json
{\"tool\": \"<tool name>\", \"arguments\": {\"<parameter>\": <value>}}
```
Call one tool at a time. After each call you will receive its result and can
call another tool or answer. When you can answer, reply in plain text without
any JSON.";

const FINALIZE_INSTRUCTION: &str = "\
You have used all available tool steps. Answer the user's last message now, in plain text, \
using only the information already in this conversation. Do not call tools.";

/// Builds system prompts and message lists for the completion service.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    tool_reference: String,
}

impl PromptBuilder {
    pub fn new(tool_reference: impl Into<String>) -> Self {
        Self {
            persona: DEFAULT_PERSONA.into(),
            tool_reference: tool_reference.into(),
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// The system prompt for a tool-enabled step.
    pub fn system_prompt(&self, facts: &[ScoredFact]) -> String {
        let mut prompt = self.persona.clone();
        push_facts(&mut prompt, facts);
        prompt.push_str("\n\n## Available tools\n\n");
        prompt.push_str(self.tool_reference.trim_end());
        prompt.push_str("\n\n");
        prompt.push_str(TOOL_PROTOCOL);
        prompt
    }

    /// The system prompt for the forced final answer. Carries no tool
    /// reference.
    pub fn finalize_prompt(&self, facts: &[ScoredFact]) -> String {
        let mut prompt = self.persona.clone();
        push_facts(&mut prompt, facts);
        prompt.push_str("\n\nTools are no longer available. Reply in plain text only.");
        prompt
    }

    /// Session history followed by the run's transcript.
    pub fn messages(history: &[ConversationTurn], transcript: &[ConversationTurn]) -> Vec<PromptMessage> {
        history.iter().chain(transcript).map(PromptMessage::from).collect()
    }

    /// Messages for the forced final answer.
    pub fn finalize_messages(
        history: &[ConversationTurn],
        transcript: &[ConversationTurn],
    ) -> Vec<PromptMessage> {
        let mut messages = Self::messages(history, transcript);
        messages.push(PromptMessage::new(
            rookery_core::message::Role::User,
            FINALIZE_INSTRUCTION,
        ));
        messages
    }
}

fn push_facts(prompt: &mut String, facts: &[ScoredFact]) {
    if facts.is_empty() {
        return;
    }
    prompt.push_str("\n\n## What you remember about this user\n");
    for hit in facts {
        prompt.push_str("- ");
        prompt.push_str(&hit.fact.text);
        prompt.push('\n');
    }
}

/// Content of the tool turn recorded after an execution.
pub fn format_tool_result(call: &ToolCall, result: &ToolResult) -> String {
    match (&result.result, &result.error) {
        (Some(text), _) if result.success => {
            let mut content = format!("Tool `{}` returned:\n{}", call.name, text);
            if let Some(artifact) = &result.artifact {
                content.push_str(&format!("\nArtifact: {artifact}"));
            }
            content
        }
        (_, Some(error)) => format!("Tool `{}` failed: {}", call.name, error),
        _ => format!("Tool `{}` returned no output.", call.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rookery_core::error::ToolError;
    use rookery_core::memory::MemoryFact;
    use rookery_core::message::Role;
    use rookery_core::tool::ToolOutput;

    fn fact(text: &str) -> ScoredFact {
        ScoredFact {
            fact: MemoryFact {
                id: "f1".into(),
                owner_id: "alice".into(),
                text: text.into(),
                category: None,
                created_at: Utc::now(),
                embedding: vec![],
            },
            score: 0.9,
        }
    }

    #[test]
    fn system_prompt_has_reference_facts_and_protocol() {
        let builder = PromptBuilder::new("### think\nThink.\nParameters: none\n");
        let prompt = builder.system_prompt(&[fact("Alice is vegetarian")]);
        assert!(prompt.starts_with(DEFAULT_PERSONA));
        assert!(prompt.contains("- Alice is vegetarian"));
        assert!(prompt.contains("### think"));
        assert!(prompt.contains("\"tool\""));
    }

    #[test]
    fn finalize_prompt_has_no_tool_reference() {
        let builder = PromptBuilder::new("### think\nThink.\n").with_persona("Be terse.");
        let prompt = builder.finalize_prompt(&[]);
        assert!(prompt.starts_with("Be terse."));
        assert!(!prompt.contains("### think"));
        assert!(!prompt.contains("What you remember"));
    }

    #[test]
    fn messages_keep_order_and_append_instruction() {
        let history = vec![ConversationTurn::user("hi"), ConversationTurn::assistant("hello")];
        let transcript = vec![ConversationTurn::user("2+2?")];
        let messages = PromptBuilder::finalize_messages(&history, &transcript);
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(&contents[..3], ["hi", "hello", "2+2?"]);
        assert_eq!(messages[3].role, Role::User);
        assert!(messages[3].content.contains("Do not call tools"));
    }

    #[test]
    fn tool_result_formatting() {
        let call = ToolCall::new("generate_image", Default::default());
        let ok = ToolResult::ok(ToolOutput {
            text: "done".into(),
            artifact: Some("cat.png".into()),
        });
        assert_eq!(
            format_tool_result(&call, &ok),
            "Tool `generate_image` returned:\ndone\nArtifact: cat.png"
        );

        let failed = ToolResult::failure(&ToolError::UnknownTool("nope".into()));
        assert_eq!(format_tool_result(&call, &failed), "Tool `generate_image` failed: unknown tool");
    }
}
