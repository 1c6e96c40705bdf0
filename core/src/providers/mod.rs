pub mod bedrock;
pub mod catalog;
pub mod factory;
pub mod gateway;
pub mod openai;
pub mod scripted;
pub mod sigv4;

pub use bedrock::BedrockProvider;
pub use factory::{DefaultProviderFactory, ProviderFactory};
pub use gateway::{AssistantReply, ModelGateway, RetryPolicy};
pub use openai::OpenAIProvider;
pub use scripted::{ScriptedProvider, ScriptedProviderFactory};
