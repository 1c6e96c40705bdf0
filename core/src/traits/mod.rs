pub mod metrics;
pub mod provider;
pub mod tool;

pub use metrics::MetricsSink;
pub use provider::{ChatRequest, ChatResponse, Provider, ProviderEvent, TokenUsage, ToolCall};
pub use tool::{Tool, ToolResult, ToolSpec};
