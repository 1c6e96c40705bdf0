use crate::conversation::ConversationTurn;
use crate::error::ModelInvocationError;
use crate::providers::sigv4::{self, AwsCredentials, SigningRequest};
use crate::traits::{ChatRequest, ChatResponse, Provider, TokenUsage, ToolCall, ToolSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// AWS Bedrock through the Converse API.
pub struct BedrockProvider {
    client: reqwest::Client,
    credentials: Option<AwsCredentials>,
    region: String,
    endpoint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseRequest {
    messages: Vec<ConverseMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<Value>,
    inference_config: InferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfig {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ConverseMessage {
    role: &'static str,
    content: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
    usage: Option<ConverseUsage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: Option<ConverseOutputMessage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutputMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentBlock {
    text: Option<String>,
    tool_use: Option<ToolUse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolUse {
    tool_use_id: String,
    name: String,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl BedrockProvider {
    pub fn new(credentials: Option<AwsCredentials>, region: impl Into<String>) -> Self {
        let region = region.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            credentials,
            endpoint: format!("https://bedrock-runtime.{}.amazonaws.com", region),
            region,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn convert_messages(turns: &[ConversationTurn]) -> Vec<ConverseMessage> {
        let mut messages: Vec<ConverseMessage> = Vec::new();

        for turn in turns {
            let (role, blocks) = match turn {
                ConversationTurn::Human { content, .. } => ("user", vec![json!({ "text": content })]),
                ConversationTurn::Assistant {
                    content,
                    tool_calls,
                    ..
                } => {
                    let mut blocks = Vec::new();
                    if !content.trim().is_empty() {
                        blocks.push(json!({ "text": content }));
                    }
                    for call in tool_calls {
                        let input = serde_json::from_str::<Value>(&call.arguments)
                            .ok()
                            .filter(Value::is_object)
                            .unwrap_or_else(|| json!({}));
                        blocks.push(json!({
                            "toolUse": {
                                "toolUseId": call.id,
                                "name": call.name,
                                "input": input,
                            }
                        }));
                    }
                    ("assistant", blocks)
                }
                ConversationTurn::ToolResult {
                    call_id,
                    content,
                    is_error,
                    ..
                } => (
                    "user",
                    vec![json!({
                        "toolResult": {
                            "toolUseId": call_id,
                            "content": [{ "text": content }],
                            "status": if *is_error { "error" } else { "success" },
                        }
                    })],
                ),
            };

            if blocks.is_empty() {
                continue;
            }

            // Converse requires alternating roles, so adjacent turns of the same
            // role share one message.
            let same_role = messages.last().is_some_and(|m| m.role == role);
            match messages.last_mut() {
                Some(last) if same_role => last.content.extend(blocks),
                _ => messages.push(ConverseMessage {
                    role,
                    content: blocks,
                }),
            }
        }

        messages
    }

    fn convert_tools(tools: &[ToolSpec]) -> Value {
        let tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "toolSpec": {
                        "name": t.name,
                        "description": t.description,
                        "inputSchema": { "json": t.parameters_schema },
                    }
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    fn build_request(request: &ChatRequest<'_>) -> ConverseRequest {
        ConverseRequest {
            messages: Self::convert_messages(request.turns),
            system: if request.system.is_empty() {
                vec![]
            } else {
                vec![json!({ "text": request.system })]
            },
            inference_config: InferenceConfig {
                temperature: request.model.temperature,
                max_tokens: request.model.max_tokens,
                top_p: request.model.top_p,
            },
            tool_config: request
                .tools
                .filter(|t| !t.is_empty())
                .map(Self::convert_tools),
        }
    }

    fn parse_response(response: ConverseResponse) -> ChatResponse {
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();

        let blocks = response.output.message.map(|m| m.content).unwrap_or_default();
        for block in blocks {
            if let Some(text) = block.text {
                text_parts.push(text);
            }
            if let Some(tool_use) = block.tool_use {
                tool_calls.push(ToolCall {
                    id: tool_use.tool_use_id,
                    name: tool_use.name,
                    arguments: tool_use.input.to_string(),
                });
            }
        }

        ChatResponse {
            text: (!text_parts.is_empty()).then(|| text_parts.join("")),
            tool_calls,
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
        }
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, ModelInvocationError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ModelInvocationError::Credentials(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set".to_string(),
            )
        })?;

        let body = serde_json::to_vec(&Self::build_request(&request))
            .map_err(|e| ModelInvocationError::Provider(e.to_string()))?;

        let path = format!(
            "/model/{}/converse",
            sigv4::uri_encode(&request.model.model_name)
        );
        let url = reqwest::Url::parse(&format!("{}{}", self.endpoint, path))
            .map_err(|e| ModelInvocationError::Provider(format!("invalid endpoint: {}", e)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(ModelInvocationError::Provider(
                    "endpoint has no host".to_string(),
                ));
            }
        };

        let signed = sigv4::sign(
            &SigningRequest {
                method: "POST",
                host: &host,
                path: url.path(),
                headers: &[("content-type", "application/json")],
                payload: &body,
            },
            credentials,
            &self.region,
            "bedrock",
            chrono::Utc::now(),
        );

        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Amz-Date", &signed.amz_date)
            .header("Authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            builder = builder.header("X-Amz-Security-Token", token);
        }

        let response = builder.body(body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelInvocationError::Http {
                provider: "bedrock".to_string(),
                status,
                message,
            });
        }

        let converse: ConverseResponse = response
            .json()
            .await
            .map_err(|e| ModelInvocationError::Malformed(e.to_string()))?;

        Ok(Self::parse_response(converse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ModelConfig, ModelProvider};
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        }
    }

    #[test]
    fn tool_results_merge_into_one_user_message() {
        let turns = vec![
            ConversationTurn::human("add things"),
            ConversationTurn::assistant(
                "",
                vec![
                    ToolCall {
                        id: "a".into(),
                        name: "calculate".into(),
                        arguments: r#"{"expression":"1+1"}"#.into(),
                    },
                    ToolCall {
                        id: "b".into(),
                        name: "calculate".into(),
                        arguments: r#"{"expression":"2+2"}"#.into(),
                    },
                ],
            ),
            ConversationTurn::tool_result("a", "calculate", "2", false),
            ConversationTurn::tool_result("b", "calculate", "4", false),
        ];

        let messages = BedrockProvider::convert_messages(&turns);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content.len(), 2);
        assert_eq!(messages[1].content[0]["toolUse"]["input"]["expression"], "1+1");
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content.len(), 2);
        assert_eq!(messages[2].content[1]["toolResult"]["toolUseId"], "b");
    }

    #[tokio::test]
    async fn converse_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/model/anthropic.claude-v2%3A1/converse"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": {
                    "message": {
                        "role": "assistant",
                        "content": [
                            { "text": "Computing." },
                            { "toolUse": { "toolUseId": "tu1", "name": "calculate", "input": { "expression": "3*3" } } }
                        ]
                    }
                },
                "stopReason": "tool_use",
                "usage": { "inputTokens": 20, "outputTokens": 8, "totalTokens": 28 }
            })))
            .mount(&server)
            .await;

        let provider =
            BedrockProvider::new(Some(credentials()), "us-east-1").with_endpoint(server.uri());
        let model = ModelConfig::new(ModelProvider::Bedrock, "anthropic.claude-v2:1");
        let turns = vec![ConversationTurn::human("3*3?")];
        let response = provider
            .chat(ChatRequest {
                system: "sys",
                turns: &turns,
                tools: None,
                model: &model,
            })
            .await
            .unwrap();

        assert_eq!(response.text.as_deref(), Some("Computing."));
        assert_eq!(response.tool_calls[0].id, "tu1");
        assert_eq!(response.tool_calls[0].arguments, r#"{"expression":"3*3"}"#);
        assert_eq!(response.usage.unwrap().total(), 28);
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_request() {
        let provider = BedrockProvider::new(None, "us-east-1");
        let model = ModelConfig::new(ModelProvider::Bedrock, "anthropic.claude-v2");
        let err = provider
            .chat(ChatRequest {
                system: "",
                turns: &[],
                tools: None,
                model: &model,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ModelInvocationError::Credentials(_)));
    }
}
