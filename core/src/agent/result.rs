use crate::agent::AgentStatus;
use crate::conversation::{ConversationTurn, ToolCallRecord};
use crate::traits::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why a run ended as failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AgentNotFound,
    ModelInvocation,
}

/// Everything a caller (or a metrics sink) learns about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub agent_id: String,
    pub session_id: String,
    pub response: String,
    pub status: AgentStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub tool_calls: Vec<ToolCallRecord>,
    pub iteration_count: usize,
    /// Set when the iteration budget ran out before a final answer.
    pub truncated: bool,
    pub token_usage: TokenUsage,
    pub messages: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Completed
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}
