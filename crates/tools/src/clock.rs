//! `get_time`: the current time in a named IANA timezone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rookery_core::error::ToolError;
use rookery_core::tool::{ToolArguments, ToolContext, ToolHandler, ToolOutput};

use crate::optional_str;
use crate::registry::GET_TIME;

pub struct GetTimeTool;

impl GetTimeTool {
    /// Render `now` in `timezone` (UTC when absent or blank).
    pub fn render(now: DateTime<Utc>, timezone: Option<&str>) -> Result<String, ToolError> {
        let name = timezone.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("UTC");
        let tz: Tz = name
            .parse()
            .map_err(|_| ToolError::failed(GET_TIME, format!("unknown timezone '{name}'")))?;
        let local = now.with_timezone(&tz);
        Ok(format!(
            "{} ({}, {}) {}",
            local.format("%Y-%m-%d %H:%M:%S %Z"),
            tz.name(),
            local.format("UTC%:z"),
            local.format("%A"),
        ))
    }
}

#[async_trait]
impl ToolHandler for GetTimeTool {
    fn name(&self) -> &str {
        GET_TIME
    }

    async fn call(&self, arguments: ToolArguments, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let text = Self::render(Utc::now(), optional_str(&arguments, "timezone"))?;
        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn defaults_to_utc() {
        let text = GetTimeTool::render(fixed(), None).unwrap();
        assert!(text.starts_with("2024-03-01 12:30:00 UTC"), "{text}");
        assert!(text.ends_with("Friday"));
    }

    #[test]
    fn converts_to_named_zone() {
        let text = GetTimeTool::render(fixed(), Some("Asia/Tokyo")).unwrap();
        assert!(text.starts_with("2024-03-01 21:30:00 JST"), "{text}");
        assert!(text.contains("Asia/Tokyo"));
        assert!(text.contains("UTC+09:00"));
    }

    #[test]
    fn unknown_zone_fails() {
        let err = GetTimeTool::render(fixed(), Some("Mars/Olympus")).unwrap_err();
        assert_eq!(err.to_string(), "unknown timezone 'Mars/Olympus'");
    }

    #[tokio::test]
    async fn blank_zone_is_utc() {
        let args = serde_json::json!({"timezone": " "}).as_object().cloned().unwrap();
        let out = GetTimeTool.call(args, ToolContext::default()).await.unwrap();
        assert!(out.text.contains("(UTC,"));
    }
}
