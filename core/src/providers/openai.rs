use crate::conversation::ConversationTurn;
use crate::error::ModelInvocationError;
use crate::traits::provider::ProviderStream;
use crate::traits::{ChatRequest, ChatResponse, Provider, ProviderEvent, TokenUsage, ToolCall, ToolSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest<'a> {
    id: &'a str,
    r#type: &'a str,
    function: OpenAIFunctionRequest<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionRequest<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIToolFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_timeout(api_key, Duration::from_secs(120))
    }

    pub fn with_timeout(api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn convert_messages<'a>(system: &'a str, turns: &'a [ConversationTurn]) -> Vec<OpenAIMessage<'a>> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if !system.is_empty() {
            messages.push(OpenAIMessage {
                role: "system",
                content: Some(system),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for turn in turns {
            let message = match turn {
                ConversationTurn::Human { content, .. } => OpenAIMessage {
                    role: "user",
                    content: Some(content),
                    tool_calls: None,
                    tool_call_id: None,
                },
                ConversationTurn::Assistant {
                    content,
                    tool_calls,
                    ..
                } => {
                    let calls = (!tool_calls.is_empty()).then(|| {
                        tool_calls
                            .iter()
                            .map(|tc| OpenAIToolCallRequest {
                                id: &tc.id,
                                r#type: "function",
                                function: OpenAIFunctionRequest {
                                    name: &tc.name,
                                    arguments: &tc.arguments,
                                },
                            })
                            .collect()
                    });
                    OpenAIMessage {
                        role: "assistant",
                        content: (!content.is_empty() || calls.is_none()).then_some(content.as_str()),
                        tool_calls: calls,
                        tool_call_id: None,
                    }
                }
                ConversationTurn::ToolResult {
                    call_id, content, ..
                } => OpenAIMessage {
                    role: "tool",
                    content: Some(content),
                    tool_calls: None,
                    tool_call_id: Some(call_id),
                },
            };
            messages.push(message);
        }

        messages
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<OpenAITool> {
        tools
            .iter()
            .map(|t| OpenAITool {
                r#type: "function".to_string(),
                function: OpenAIToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters_schema.clone(),
                },
            })
            .collect()
    }

    fn build_request<'a>(request: &ChatRequest<'a>, stream: bool) -> OpenAIRequest<'a> {
        OpenAIRequest {
            model: &request.model.model_name,
            messages: Self::convert_messages(request.system, request.turns),
            tools: request
                .tools
                .filter(|t| !t.is_empty())
                .map(Self::convert_tools),
            temperature: request.model.temperature,
            max_tokens: request.model.max_tokens,
            top_p: request.model.top_p,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, body: &OpenAIRequest<'_>) -> Result<reqwest::Response, ModelInvocationError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ModelInvocationError::Credentials("OPENAI_API_KEY is not set".to_string())
        })?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelInvocationError::Http {
                provider: "openai".to_string(),
                status,
                message,
            });
        }

        Ok(response)
    }

    fn parse_sse_line(
        line: &str,
        pending: &mut BTreeMap<usize, (String, String, String)>,
    ) -> Vec<ProviderEvent> {
        let Some(data) = line.trim().strip_prefix("data:") else {
            return vec![];
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return vec![];
        }

        let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
            tracing::debug!(line = %data, "Skipping unparseable stream chunk");
            return vec![];
        };

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content
                && !content.is_empty()
            {
                events.push(ProviderEvent::Token(content));
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let entry = pending.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    entry.0 = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.1.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.2.push_str(&arguments);
                    }
                }
            }
        }
        if let Some(usage) = chunk.usage {
            events.push(ProviderEvent::Usage(TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            }));
        }
        events
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, ModelInvocationError> {
        let body = Self::build_request(&request, false);
        let response = self.send(&body).await?;

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ModelInvocationError::Malformed(e.to_string()))?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelInvocationError::Malformed("No choices in response".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                name: c.function.name,
                arguments: c.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            text: choice.message.content,
            tool_calls,
            usage: openai_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }

    async fn chat_stream(&self, request: ChatRequest<'_>) -> Result<ProviderStream, ModelInvocationError> {
        let body = Self::build_request(&request, true);
        let response = self.send(&body).await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<ProviderEvent, ModelInvocationError>>(256);

        tokio::spawn(async move {
            use futures_util::StreamExt as _;
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut pending: BTreeMap<usize, (String, String, String)> = BTreeMap::new();

            while let Some(chunk_result) = stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        buffer.extend_from_slice(&chunk);

                        for line in drain_lines(&mut buffer) {
                            for event in Self::parse_sse_line(&line, &mut pending) {
                                if tx.send(Ok(event)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                }
            }

            let rest = String::from_utf8_lossy(&buffer);
            for event in Self::parse_sse_line(&rest, &mut pending) {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }

            for (index, (id, name, arguments)) in pending {
                let id = if id.is_empty() {
                    format!("call_{}", index)
                } else {
                    id
                };
                let call = ToolCall {
                    id,
                    name,
                    arguments,
                };
                if tx.send(Ok(ProviderEvent::ToolCall(call))).await.is_err() {
                    return;
                }
            }

            let _ = tx.send(Ok(ProviderEvent::Done)).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

/// Remove every complete line from `buffer` and decode it.
///
/// Bytes after the last newline stay buffered, so a character split across
/// network chunks is decoded only once both halves have arrived.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let Some(last) = buffer.iter().rposition(|&b| b == b'\n') else {
        return vec![];
    };
    let complete: Vec<u8> = buffer.drain(..=last).collect();
    complete[..last]
        .split(|&b| b == b'\n')
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ModelConfig, ModelProvider};
    use futures_util::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model() -> ModelConfig {
        ModelConfig::new(ModelProvider::OpenAI, "gpt-4").with_temperature(0.3)
    }

    #[tokio::test]
    async fn chat_parses_tool_calls_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4", "temperature": 0.3 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "calculate", "arguments": "{\"expression\":\"2+2\"}" }
                        }]
                    }
                }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17 }
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(Some("sk-test".into())).with_base_url(server.uri());
        let turns = vec![ConversationTurn::human("What is 2+2?")];
        let model = model();
        let response = provider
            .chat(ChatRequest {
                system: "be brief",
                turns: &turns,
                tools: None,
                model: &model,
            })
            .await
            .unwrap();

        assert!(response.text.is_none());
        assert_eq!(response.tool_calls[0].name, "calculate");
        assert_eq!(response.usage.unwrap().total(), 17);
    }

    #[tokio::test]
    async fn http_error_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(Some("sk".into())).with_base_url(server.uri());
        let model = model();
        let err = provider
            .chat(ChatRequest {
                system: "",
                turns: &[],
                tools: None,
                model: &model,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ModelInvocationError::Http { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_key_is_a_credentials_error() {
        let provider = OpenAIProvider::new(None);
        let model = model();
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

    #[tokio::test]
    async fn stream_assembles_tool_call_fragments() {
        let body = [
            r#"data: {"choices":[{"delta":{"content":"Let me "}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"check."}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"calculate","arguments":"{\"expr"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ession\":\"1+1\"}"}}]}}]}"#,
            r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4}}"#,
            "data: [DONE]",
            "",
        ]
        .join("\n\n");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(Some("sk".into())).with_base_url(server.uri());
        let model = model();
        let turns = vec![ConversationTurn::human("1+1?")];
        let events: Vec<ProviderEvent> = provider
            .chat_stream(ChatRequest {
                system: "",
                turns: &turns,
                tools: None,
                model: &model,
            })
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                ProviderEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Let me check.");

        let call = events
            .iter()
            .find_map(|e| match e {
                ProviderEvent::ToolCall(c) => Some(c.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(call.id, "call_9");
        assert_eq!(call.arguments, r#"{"expression":"1+1"}"#);
        assert!(events.iter().any(|e| matches!(e, ProviderEvent::Usage(u) if u.total() == 7)));
        assert!(matches!(events.last(), Some(ProviderEvent::Done)));
    }

    #[test]
    fn multibyte_character_split_across_chunks_survives() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9} \u{1f600}\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xc3).unwrap() + 1;

        let mut buffer = Vec::new();
        buffer.extend_from_slice(&line[..split]);
        assert!(drain_lines(&mut buffer).is_empty());
        buffer.extend_from_slice(&line[split..]);
        let lines = drain_lines(&mut buffer);
        assert!(buffer.is_empty());
        assert_eq!(lines.len(), 1);

        let mut pending = BTreeMap::new();
        let events = OpenAIProvider::parse_sse_line(&lines[0], &mut pending);
        assert!(matches!(&events[..], [ProviderEvent::Token(t)] if t == "caf\u{e9} \u{1f600}"));
    }

    #[test]
    fn drain_lines_keeps_partial_tail() {
        let mut buffer = b"data: a\n\ndata: b\ndata: par".to_vec();
        assert_eq!(drain_lines(&mut buffer), vec!["data: a", "", "data: b"]);
        assert_eq!(buffer, b"data: par");
    }

    #[test]
    fn assistant_tool_call_turn_omits_empty_content() {
        let turns = vec![
            ConversationTurn::human("hi"),
            ConversationTurn::assistant(
                "",
                vec![ToolCall {
                    id: "c1".into(),
                    name: "calculate".into(),
                    arguments: "{}".into(),
                }],
            ),
            ConversationTurn::tool_result("c1", "calculate", "4", false),
        ];
        let messages = OpenAIProvider::convert_messages("sys", &turns);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert!(messages[2].content.is_none());
        assert_eq!(messages[3].tool_call_id, Some("c1"));
    }
}
