use crate::agent::ModelConfig;
use crate::conversation::ConversationTurn;
use crate::error::ModelInvocationError;
use crate::traits::{ChatRequest, ChatResponse, Provider, ProviderEvent, TokenUsage, ToolCall, ToolSpec};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const TOOL_CALL_OPEN_TAG: &str = "<tool_call>";
const TOOL_CALL_CLOSE_TAG: &str = "</tool_call>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1)
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// The model's next message as the engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// Single request/response boundary between the engine and a provider.
/// Streaming, retries and tag-based tool-call extraction all happen here.
pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    model: ModelConfig,
    retry: RetryPolicy,
    streaming: bool,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Provider>, model: ModelConfig) -> Self {
        Self {
            provider,
            model,
            retry: RetryPolicy::default(),
            streaming: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub async fn invoke(
        &self,
        system: &str,
        turns: &[ConversationTurn],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, ModelInvocationError> {
        let request = ChatRequest {
            system,
            turns,
            tools: (!tools.is_empty()).then_some(tools),
            model: &self.model,
        };

        let mut attempt = 1;
        let response = loop {
            match self.call_once(request).await {
                Ok(response) => break response,
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        Self::into_reply(response, !tools.is_empty())
    }

    async fn call_once(&self, request: ChatRequest<'_>) -> Result<ChatResponse, ModelInvocationError> {
        if !(self.streaming && self.provider.supports_streaming()) {
            return self.provider.chat(request).await;
        }

        let mut stream = self.provider.chat_stream(request).await?;
        let mut text: Option<String> = None;
        let mut tool_calls = Vec::new();
        let mut usage: Option<TokenUsage> = None;

        while let Some(event) = stream.next().await {
            match event? {
                ProviderEvent::Token(token) => text.get_or_insert_with(String::new).push_str(&token),
                ProviderEvent::ToolCall(call) => tool_calls.push(call),
                ProviderEvent::Usage(u) => usage.get_or_insert_with(TokenUsage::default).accumulate(&u),
                ProviderEvent::Done => break,
            }
        }

        Ok(ChatResponse {
            text,
            tool_calls,
            usage,
        })
    }

    fn into_reply(response: ChatResponse, tools_offered: bool) -> Result<AssistantReply, ModelInvocationError> {
        let usage = response.usage.unwrap_or_default();

        if response.has_tool_calls() {
            return Ok(AssistantReply {
                content: response.text.unwrap_or_default(),
                tool_calls: response.tool_calls,
                usage,
            });
        }

        let Some(text) = response.text else {
            return Err(ModelInvocationError::Malformed(
                "response contained neither text nor tool calls".to_string(),
            ));
        };

        if tools_offered && text.contains(TOOL_CALL_OPEN_TAG) {
            let (content, tool_calls) = parse_tool_calls_fallback(&text);
            if !tool_calls.is_empty() {
                debug!(count = tool_calls.len(), "Extracted tagged tool calls from text");
                return Ok(AssistantReply {
                    content,
                    tool_calls,
                    usage,
                });
            }
        }

        Ok(AssistantReply {
            content: text,
            tool_calls: vec![],
            usage,
        })
    }
}

/// Pull `<tool_call>{"name": .., "arguments": ..}</tool_call>` blocks out of
/// plain text. Returns the remaining text and the calls found.
pub fn parse_tool_calls_fallback(response: &str) -> (String, Vec<ToolCall>) {
    let mut text_parts = Vec::new();
    let mut calls = Vec::new();
    let mut remaining = response;

    while let Some(start) = remaining.find(TOOL_CALL_OPEN_TAG) {
        let before = &remaining[..start];
        if !before.trim().is_empty() {
            text_parts.push(before.trim().to_string());
        }

        let after_open = &remaining[start + TOOL_CALL_OPEN_TAG.len()..];
        let Some(close_idx) = after_open.find(TOOL_CALL_CLOSE_TAG) else {
            break;
        };

        let inner = &after_open[..close_idx];
        calls.extend(extract_json_values(inner).iter().filter_map(parse_tool_call_value));
        remaining = &after_open[close_idx + TOOL_CALL_CLOSE_TAG.len()..];
    }

    if !remaining.trim().is_empty() {
        text_parts.push(remaining.trim().to_string());
    }

    (text_parts.join("\n"), calls)
}

fn extract_json_values(text: &str) -> Vec<serde_json::Value> {
    let mut values = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start
                        && let Ok(value) = serde_json::from_str::<serde_json::Value>(&text[s..=i])
                    {
                        values.push(value);
                    }
                    start = None;
                }
            }
            _ => {}
        }
    }

    values
}

fn parse_tool_call_value(value: &serde_json::Value) -> Option<ToolCall> {
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = match value.get("arguments") {
        Some(serde_json::Value::String(raw)) => raw.clone(),
        Some(other) => other.to_string(),
        None => "{}".to_string(),
    };
    let digest = md5::compute(format!("{}:{}", name, arguments).as_bytes());

    Some(ToolCall {
        id: format!("call_{:x}", digest),
        name,
        arguments,
    })
}
