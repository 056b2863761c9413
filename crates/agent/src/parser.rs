//! Extraction of a structured tool call from free-form model text.
//!
//! The model is asked to reply with `{"tool": <name>, "arguments": {...}}`
//! when it wants a tool, but replies arrive wrapped in prose, in fenced
//! blocks, or both. [`ResponseParser`] runs an ordered list of independent
//! strategies and returns the first call any of them decodes.

use rookery_core::tool::{ToolArguments, ToolCall};
use serde_json::Value;

/// One extraction strategy. Returns `None` when it finds nothing usable.
pub type Strategy = fn(&str) -> Option<ToolCall>;

/// Ordered, short-circuiting tool-call extraction.
#[derive(Clone)]
pub struct ResponseParser {
    strategies: Vec<(&'static str, Strategy)>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            strategies: vec![
                ("json_fence", json_fence),
                ("any_fence", any_fence),
                ("bare_object", bare_object),
            ],
        }
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the strategies, in the order they run.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|(name, _)| *name).collect()
    }

    /// The first tool call any strategy extracts, or `None` for a plain answer.
    pub fn parse(&self, text: &str) -> Option<ToolCall> {
        self.strategies.iter().find_map(|(name, strategy)| {
            let call = strategy(text)?;
            tracing::trace!(strategy = *name, tool = %call.name, "Parsed tool call");
            Some(call)
        })
    }
}

/// Blocks fenced with ```` ```json ````.
pub fn json_fence(text: &str) -> Option<ToolCall> {
    fenced_blocks(text)
        .into_iter()
        .filter(|(info, _)| info.eq_ignore_ascii_case("json"))
        .find_map(|(_, body)| decode_candidate(body))
}

/// Any fenced block, whatever its label.
pub fn any_fence(text: &str) -> Option<ToolCall> {
    fenced_blocks(text)
        .into_iter()
        .find_map(|(_, body)| decode_candidate(body))
}

/// A bare `{...}` object anywhere in the text.
///
/// Candidates are tried outermost first, in order of their opening brace.
pub fn bare_object(text: &str) -> Option<ToolCall> {
    if !text.contains("\"tool\"") {
        return None;
    }
    let mut spans = balanced_spans(text);
    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
        .into_iter()
        .find_map(|(start, end)| decode_candidate(&text[start..=end]))
}

/// Decode one candidate into a call.
///
/// Requires an object with a non-empty string `tool`. `arguments` may be
/// absent or null (empty) but must otherwise be an object.
fn decode_candidate(candidate: &str) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(candidate.trim()).ok()?;
    let object = value.as_object()?;

    let name = object.get("tool")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let arguments = match object.get("arguments") {
        None | Some(Value::Null) => ToolArguments::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return None,
    };
    Some(ToolCall::new(name, arguments))
}

/// `(info string, body)` for every fenced block, in order.
///
/// An unterminated final fence runs to the end of the text.
fn fenced_blocks(text: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_ticks = &rest[open + 3..];
        let (info, body_start) = match after_ticks.find('\n') {
            Some(nl) => (after_ticks[..nl].trim(), &after_ticks[nl + 1..]),
            None => ("", after_ticks),
        };
        match body_start.find("```") {
            Some(close) => {
                blocks.push((info, &body_start[..close]));
                rest = &body_start[close + 3..];
            }
            None => {
                blocks.push((info, body_start));
                break;
            }
        }
    }
    blocks
}

/// Inclusive byte spans of every balanced `{...}` in `text`, in one pass.
///
/// Braces inside JSON strings are skipped. Quotes in prose between objects
/// are ignored, and braces that never close yield nothing.
fn balanced_spans(text: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Option<ToolCall> {
        ResponseParser::new().parse(text)
    }

    #[test]
    fn json_fenced_call() {
        let text = "Let me look.\n```json\n{\"tool\":\"web_search\",\"arguments\":{\"query\":\"x\"}}\n```";
        let call = parse(text).unwrap();
        assert_eq!(call.name, "web_search");
        assert_eq!(call.arguments.get("query"), Some(&json!("x")));
        assert_eq!(call.arguments.len(), 1);
    }

    #[test]
    fn plain_text_is_not_a_call() {
        assert!(parse("The capital of Japan is Tokyo.").is_none());
        assert!(parse("").is_none());
        assert!(parse("Use {braces} freely, {\"name\": \"x\"}").is_none());
    }

    #[test]
    fn strategies_run_in_order() {
        assert_eq!(
            ResponseParser::new().strategy_names(),
            ["json_fence", "any_fence", "bare_object"]
        );

        // A json fence wins over an earlier unlabeled fence.
        let text = "```\n{\"tool\":\"think\",\"arguments\":{\"thought\":\"a\"}}\n```\n\
                    ```json\n{\"tool\":\"calculate\",\"arguments\":{\"expression\":\"1\"}}\n```";
        assert_eq!(parse(text).unwrap().name, "calculate");
    }

    #[test]
    fn unlabeled_fence() {
        let text = "```\n{\"tool\": \"get_time\"}\n```";
        let call = any_fence(text).unwrap();
        assert_eq!(call.name, "get_time");
        assert!(call.arguments.is_empty());
        assert!(json_fence(text).is_none());
    }

    #[test]
    fn bare_object_in_prose() {
        let text = r#"I'll compute it: {"tool": "calculate", "arguments": {"expression": "2 * (3 + 4)"}} and report back."#;
        let call = bare_object(text).unwrap();
        assert_eq!(call.name, "calculate");
        assert_eq!(call.arguments["expression"], json!("2 * (3 + 4)"));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let text = r#"{"tool": "think", "arguments": {"thought": "a } tricky { \"quoted\" value"}}"#;
        let call = parse(text).unwrap();
        assert_eq!(call.arguments["thought"], json!("a } tricky { \"quoted\" value"));
    }

    #[test]
    fn nested_object_with_tool_key_is_found() {
        let text = r#"{"plan": "search", "step": {"tool": "web_search", "arguments": {"query": "rust"}}}"#;
        assert_eq!(parse(text).unwrap().name, "web_search");
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(parse(r#"{"tool": 42}"#).is_none());
        assert!(parse(r#"{"tool": "  "}"#).is_none());
        assert!(parse(r#"{"tool": "think", "arguments": "thought=x"}"#).is_none());
        assert!(parse(r#"{"tool": "think", "arguments": [1, 2]}"#).is_none());
    }

    #[test]
    fn null_arguments_are_empty() {
        let call = parse(r#"{"tool": "get_time", "arguments": null}"#).unwrap();
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn broken_fence_falls_through_to_scan() {
        let text = "```json\n{\"tool\": \"think\", oops}\n```\nActually: {\"tool\": \"get_time\"}";
        assert_eq!(parse(text).unwrap().name, "get_time");
    }

    #[test]
    fn unterminated_fence_runs_to_end() {
        let text = "```json\n{\"tool\": \"recall\", \"arguments\": {\"query\": \"pets\"}}";
        assert_eq!(json_fence(text).unwrap().name, "recall");
    }

    #[test]
    fn unclosed_brace_before_a_call_is_skipped() {
        let text = r#"Thinking {out loud... {"tool": "get_time"} done"#;
        assert_eq!(bare_object(text).unwrap().name, "get_time");
    }

    #[test]
    fn long_run_of_open_braces_scans_once() {
        let mut text = String::from("\"tool\" ");
        text.push_str(&"{".repeat(200_000));
        assert_eq!(balanced_spans(&text), Vec::new());
        assert!(bare_object(&text).is_none());

        text.push_str(r#"{"tool": "think", "arguments": {"thought": "x"}}"#);
        assert_eq!(bare_object(&text).unwrap().name, "think");
    }

    #[test]
    fn hostile_inputs_do_not_panic() {
        let inputs = [
            "{{{{{{{{",
            "}}}}}}",
            "```",
            "``````",
            "\"tool\" {\"tool\": \"x\"",
            "{\"tool\": \"é\u{301}\", \"arguments\": {\"k\": \"🦀\"}}",
            "```json",
            "{\"tool\":\"a\\",
        ];
        for input in inputs {
            let _ = parse(input);
        }
        assert_eq!(parse(inputs[5]).unwrap().arguments["k"], json!("🦀"));
    }
}
