use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        Ok(ToolResult::success(now.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_timestamp() {
        let result = CurrentTimeTool.execute(json!({})).await.unwrap();
        assert!(result.success);
        assert!(chrono::NaiveDateTime::parse_from_str(&result.output, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
