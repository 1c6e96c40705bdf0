use crate::tools::{extract_string_arg, extract_usize_arg_opt};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_NUM_RESULTS: usize = 5;

/// Canned search results. Stands in for a real search backend.
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Perform a web search"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return",
                    "default": DEFAULT_NUM_RESULTS
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let query = extract_string_arg(&args, "query")?;
        let num_results = extract_usize_arg_opt(&args, "num_results", DEFAULT_NUM_RESULTS);

        Ok(ToolResult::success(format!(
            "Mock search results for '{query}' (top {num_results} results):\n\
             1. Example result 1 for {query}\n\
             2. Example result 2 for {query}\n\
             3. Example result 3 for {query}"
        )))
    }
}
