pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod providers;
pub mod tools;
pub mod traits;

pub use agent::{
    Agent, AgentConfig, AgentId, AgentLoop, AgentRegistry, AgentStatus, ExecutionResult,
    FailureKind, ModelConfig, ModelProvider, ToolDeclaration,
};
pub use config::Settings;
pub use conversation::{ConversationTurn, RunState, ToolCallRecord};
pub use error::{Error, ModelInvocationError, Result, ToolExecutionError, ValidationError};
pub use metrics::{InMemoryMetrics, TracingMetricsSink};
pub use providers::{DefaultProviderFactory, ModelGateway, ProviderFactory};
pub use tools::ToolRegistry;
pub use traits::*;
