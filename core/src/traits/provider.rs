use crate::agent::ModelConfig;
use crate::conversation::ConversationTurn;
use crate::error::ModelInvocationError;
use crate::traits::ToolSpec;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON text exactly as the model produced it.
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: vec![],
            usage: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub turns: &'a [ConversationTurn],
    pub tools: Option<&'a [ToolSpec]>,
    pub model: &'a ModelConfig,
}

#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Token(String),
    ToolCall(ToolCall),
    Usage(TokenUsage),
    Done,
}

pub type ProviderStream = BoxStream<'static, Result<ProviderEvent, ModelInvocationError>>;

/// A provider-specific model client. Only the model gateway talks to these.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, ModelInvocationError>;

    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
    ) -> Result<ProviderStream, ModelInvocationError> {
        let response = self.chat(request).await?;
        let mut events = Vec::new();
        if let Some(text) = response.text {
            events.push(Ok(ProviderEvent::Token(text)));
        }
        events.extend(response.tool_calls.into_iter().map(|c| Ok(ProviderEvent::ToolCall(c))));
        if let Some(usage) = response.usage {
            events.push(Ok(ProviderEvent::Usage(usage)));
        }
        events.push(Ok(ProviderEvent::Done));
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}
