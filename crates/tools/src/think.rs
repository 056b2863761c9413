//! `think`: a side-effect-free scratchpad.

use async_trait::async_trait;
use rookery_core::error::ToolError;
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};

use crate::registry::THINK;
use crate::required_str;

pub struct ThinkTool;

#[async_trait]
impl ToolHandler for ThinkTool {
    fn name(&self) -> &str {
        THINK
    }

    async fn call(&self, arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let thought = required_str(&arguments, THINK, "thought")?;
        Ok(ToolOutput::text(format!("Noted: {}", thought.trim())))
    }
}
