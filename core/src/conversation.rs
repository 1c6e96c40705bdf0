use crate::traits::{TokenUsage, ToolCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of the dialogue log. The sequence of turns is append-only and is
/// the literal context handed to the model on every iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ConversationTurn {
    Human {
        content: String,
        created_at: DateTime<Utc>,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
        created_at: DateTime<Utc>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
        created_at: DateTime<Utc>,
    },
}

impl ConversationTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self::Human {
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
            created_at: Utc::now(),
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            is_error,
            created_at: Utc::now(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Human { content, .. }
            | Self::Assistant { content, .. }
            | Self::ToolResult { content, .. } => content,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::Human { .. } => "human",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: String,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

/// Working state of a single run. Owned by that run alone and dropped when it
/// returns; only what is copied into the result record survives.
#[derive(Debug)]
pub struct RunState {
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
    pub iteration: usize,
    pub tool_calls: Vec<ToolCallRecord>,
    pub context: BTreeMap<String, serde_json::Value>,
    pub usage: TokenUsage,
}

impl RunState {
    pub fn new(
        input: &str,
        session_id: Option<String>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            session_id: session_id
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            turns: vec![ConversationTurn::human(input)],
            iteration: 0,
            tool_calls: Vec::new(),
            context,
            usage: TokenUsage::default(),
        }
    }

    /// Most recent assistant text that is not blank.
    pub fn last_assistant_content(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            ConversationTurn::Assistant { content, .. } if !content.trim().is_empty() => {
                Some(content.as_str())
            }
            _ => None,
        })
    }
}
