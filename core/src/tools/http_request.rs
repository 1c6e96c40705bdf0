use crate::tools::{extract_string_arg, extract_string_arg_opt};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_CHARS: usize = 1000;

pub struct HttpRequestTool {
    client: reqwest::Client,
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequestTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Make an HTTP request"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to request"
                },
                "method": {
                    "type": "string",
                    "description": "HTTP method (GET or POST)",
                    "default": "GET"
                },
                "data": {
                    "type": "string",
                    "description": "Request body (for POST requests)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let url = extract_string_arg(&args, "url")?;
        let method = extract_string_arg_opt(&args, "method", "GET").to_uppercase();

        let request = match method.as_str() {
            "GET" => self.client.get(&url),
            "POST" => {
                let data = args.get("data").and_then(|v| v.as_str()).unwrap_or("");
                self.client
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .body(data.to_string())
            }
            other => {
                return Ok(ToolResult::error(format!(
                    "Unsupported HTTP method: {}",
                    other
                )));
            }
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Error making HTTP request: {}",
                    e
                )));
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => {
                let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
                Ok(ToolResult::success(format!(
                    "Status: {}\nContent: {}",
                    status, truncated
                )))
            }
            Err(e) => Ok(ToolResult::error(format!(
                "Error making HTTP request: {}",
                e
            ))),
        }
    }
}
