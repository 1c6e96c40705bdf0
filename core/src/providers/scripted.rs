//! Deterministic provider that plays back a queued script. Used by tests and
//! for driving the engine without network access.

use crate::agent::ModelConfig;
use crate::conversation::ConversationTurn;
use crate::error::ModelInvocationError;
use crate::providers::factory::ProviderFactory;
use crate::providers::gateway::RetryPolicy;
use crate::traits::provider::ProviderStream;
use crate::traits::{ChatRequest, ChatResponse, Provider, ProviderEvent, TokenUsage, ToolCall};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Step = Result<ChatResponse, ModelInvocationError>;

/// A request as the provider received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub turns: Vec<ConversationTurn>,
    pub tool_names: Vec<String>,
    pub model_name: String,
}

#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
    repeat_last: bool,
    streaming: bool,
    stream_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, response: ChatResponse) -> Self {
        self.push(Ok(response))
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then(ChatResponse::text(text))
    }

    /// A reply requesting one tool call, with `arguments` as raw JSON text.
    pub fn then_tool_call(self, name: &str, arguments: &str) -> Self {
        let id = format!("call_{}", self.queued());
        self.then(ChatResponse {
            text: None,
            tool_calls: vec![ToolCall {
                id,
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            }),
        })
    }

    pub fn then_error(self, error: ModelInvocationError) -> Self {
        self.push(Err(error))
    }

    /// Keep replaying the final step once the script runs out.
    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    fn push(self, step: Step) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    fn queued(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn stream_call_count(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => match (&*last, self.repeat_last) {
                (Some(step), true) => step.clone(),
                _ => Err(ModelInvocationError::Provider(
                    "scripted provider has no more responses".to_string(),
                )),
            },
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, ModelInvocationError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                system: request.system.to_string(),
                turns: request.turns.to_vec(),
                tool_names: request
                    .tools
                    .unwrap_or_default()
                    .iter()
                    .map(|t| t.name.clone())
                    .collect(),
                model_name: request.model.model_name.clone(),
            });
        self.next_step()
    }

    async fn chat_stream(&self, request: ChatRequest<'_>) -> Result<ProviderStream, ModelInvocationError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let response = self.chat(request).await?;

        let mut events = Vec::new();
        if let Some(text) = response.text {
            // Split into word-sized tokens so assembly is exercised.
            for piece in text.split_inclusive(' ') {
                events.push(Ok(ProviderEvent::Token(piece.to_string())));
            }
        }
        events.extend(response.tool_calls.into_iter().map(|c| Ok(ProviderEvent::ToolCall(c))));
        if let Some(usage) = response.usage {
            events.push(Ok(ProviderEvent::Usage(usage)));
        }
        events.push(Ok(ProviderEvent::Done));
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }
}

/// Hands the same scripted provider to every agent it builds.
pub struct ScriptedProviderFactory {
    provider: Arc<ScriptedProvider>,
    created: Mutex<Vec<ModelConfig>>,
}

impl ScriptedProviderFactory {
    pub fn new(provider: Arc<ScriptedProvider>) -> Self {
        Self {
            provider,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn provider(&self) -> Arc<ScriptedProvider> {
        self.provider.clone()
    }

    pub fn created(&self) -> Vec<ModelConfig> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ProviderFactory for ScriptedProviderFactory {
    fn create(&self, model: &ModelConfig) -> Arc<dyn Provider> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(model.clone());
        self.provider.clone()
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::no_retry().with_backoff(Duration::ZERO, Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ModelProvider;

    #[tokio::test]
    async fn plays_back_in_order_then_runs_dry() {
        let provider = ScriptedProvider::new().then_text("one").then_text("two");
        let model = ModelConfig::new(ModelProvider::OpenAI, "gpt-4");
        let request = ChatRequest {
            system: "s",
            turns: &[],
            tools: None,
            model: &model,
        };

        assert_eq!(provider.chat(request).await.unwrap().text.as_deref(), Some("one"));
        assert_eq!(provider.chat(request).await.unwrap().text.as_deref(), Some("two"));
        assert!(provider.chat(request).await.is_err());
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.requests()[0].model_name, "gpt-4");
    }

    #[tokio::test]
    async fn repeating_replays_last_step() {
        let provider = ScriptedProvider::new()
            .then_tool_call("calculate", r#"{"expression":"1"}"#)
            .repeating();
        let model = ModelConfig::new(ModelProvider::OpenAI, "gpt-4");
        let request = ChatRequest {
            system: "s",
            turns: &[],
            tools: None,
            model: &model,
        };

        for _ in 0..3 {
            let response = provider.chat(request).await.unwrap();
            assert_eq!(response.tool_calls[0].name, "calculate");
        }
    }
}
