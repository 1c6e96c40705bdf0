pub mod config;
pub mod context;
pub mod loop_;
pub mod registry;
pub mod result;

pub use config::{AgentConfig, ModelConfig, ModelProvider, ParamType, ParameterSpec, ToolDeclaration};
pub use context::ContextBuilder;
pub use loop_::AgentLoop;
pub use registry::{Agent, AgentId, AgentRegistry, AgentStatus};
pub use result::{ExecutionResult, FailureKind};
