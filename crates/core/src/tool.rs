//! Tool definitions, calls, results, and the implementation trait.
//!
//! A [`ToolSpec`] is pure data: a name, a description, and an ordered
//! parameter schema. The catalog of specs is fixed configuration; the code
//! that runs a tool is a separate [`ToolHandler`] attached by name in the
//! executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ToolError, ValidationError};

/// Loosely-typed tool arguments as produced by the model.
pub type ToolArguments = serde_json::Map<String, Value>;

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
        }
    }

    /// Whether a JSON value has this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
        }
    }
}

/// Name of a JSON value's type, for error messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

impl ToolParameter {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            allowed: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Restrict a string parameter to a fixed set of values.
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    fn check(&self, value: &Value) -> Result<(), ValidationError> {
        if !self.param_type.matches(value) {
            return Err(ValidationError::WrongType {
                name: self.name.clone(),
                expected: self.param_type.as_str().into(),
                actual: json_type_name(value).into(),
            });
        }
        if let (Some(allowed), Some(text)) = (&self.allowed, value.as_str())
            && !allowed.iter().any(|a| a == text)
        {
            return Err(ValidationError::NotInEnum {
                name: self.name.clone(),
                value: text.into(),
                allowed: allowed.join(", "),
            });
        }
        Ok(())
    }
}

/// A tool definition: what the model sees and what the executor validates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter (declaration order is preserved).
    pub fn param(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Validate arguments field-by-field against this schema.
    ///
    /// Declared parameters are checked in declaration order, then any
    /// undeclared key is rejected. A JSON `null` counts as absent.
    pub fn validate(&self, arguments: &ToolArguments) -> Result<(), ValidationError> {
        for param in &self.parameters {
            match arguments.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ValidationError::MissingParameter(param.name.clone()));
                }
                None | Some(Value::Null) => {}
                Some(value) => param.check(value)?,
            }
        }
        if let Some(extra) = arguments
            .keys()
            .find(|k| !self.parameters.iter().any(|p| &p.name == *k))
        {
            return Err(ValidationError::UnknownParameter(extra.clone()));
        }
        Ok(())
    }
}

/// A structured tool request extracted from model text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments, not yet validated
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Look up a string argument.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// What a tool implementation returns on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    /// Artifact reference (image URL/path), if the tool produced one
    pub artifact: Option<String>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            artifact: None,
        }
    }
}

/// The outcome of one tool execution, as recorded in the transcript.
///
/// Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl ToolResult {
    pub fn ok(output: ToolOutput) -> Self {
        Self {
            success: true,
            result: Some(output.text),
            error: None,
            artifact: output.artifact,
        }
    }

    pub fn failure(error: &ToolError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
            artifact: None,
        }
    }
}

/// Per-run context handed to every tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The user whose memory `remember`/`recall` operate on
    pub owner_id: String,
    pub conversation_id: String,
}

/// A tool implementation.
///
/// Handlers run inside a spawned task that the executor aborts on timeout,
/// so arguments and context are passed by value.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The catalog name this handler implements.
    fn name(&self) -> &str;

    /// Run the tool with already-validated arguments.
    async fn call(&self, arguments: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image_spec() -> ToolSpec {
        ToolSpec::new("generate_image", "Generate an image")
            .param(ToolParameter::required("prompt", ParamType::String, "What to draw"))
            .param(
                ToolParameter::optional("style", ParamType::String, "Visual style")
                    .one_of(&["photo", "anime"]),
            )
            .param(ToolParameter::optional("count", ParamType::Number, "How many"))
    }

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn valid_arguments_pass() {
        let spec = image_spec();
        assert!(spec.validate(&args(json!({"prompt": "a cat"}))).is_ok());
        assert!(
            spec.validate(&args(json!({"prompt": "a cat", "style": "anime", "count": 2})))
                .is_ok()
        );
    }

    #[test]
    fn missing_required_parameter() {
        let err = image_spec().validate(&args(json!({"style": "photo"}))).unwrap_err();
        assert_eq!(err, ValidationError::MissingParameter("prompt".into()));
    }

    #[test]
    fn null_counts_as_missing() {
        let err = image_spec().validate(&args(json!({"prompt": null}))).unwrap_err();
        assert_eq!(err, ValidationError::MissingParameter("prompt".into()));
        assert!(image_spec().validate(&args(json!({"prompt": "x", "style": null}))).is_ok());
    }

    #[test]
    fn wrong_type() {
        let err = image_spec()
            .validate(&args(json!({"prompt": "x", "count": "two"})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::WrongType { ref name, .. } if name == "count"));
    }

    #[test]
    fn value_outside_enum() {
        let err = image_spec()
            .validate(&args(json!({"prompt": "x", "style": "cubist"})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NotInEnum { ref value, .. } if value == "cubist"));
    }

    #[test]
    fn undeclared_key_rejected() {
        let err = image_spec()
            .validate(&args(json!({"prompt": "x", "seed": 7})))
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownParameter("seed".into()));
    }

    #[test]
    fn tool_result_shape() {
        let ok = ToolResult::ok(ToolOutput::text("4"));
        assert!(ok.success && ok.result.is_some() && ok.error.is_none());

        let failed = ToolResult::failure(&ToolError::UnknownTool("x".into()));
        assert!(!failed.success && failed.result.is_none());
        assert_eq!(failed.error.as_deref(), Some("unknown tool"));

        let json = serde_json::to_string(&failed).unwrap();
        assert_eq!(json, r#"{"success":false,"error":"unknown tool"}"#);
    }
}
