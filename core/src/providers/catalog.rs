use crate::agent::ModelProvider;
use crate::error::ValidationError;

const OPENAI_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-turbo",
    "gpt-4-turbo-preview",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
];

const BEDROCK_MODELS: &[&str] = &[
    "anthropic.claude-3-opus-20240229-v1:0",
    "anthropic.claude-3-sonnet-20240229-v1:0",
    "anthropic.claude-3-haiku-20240307-v1:0",
    "anthropic.claude-v2:1",
    "anthropic.claude-v2",
    "anthropic.claude-instant-v1",
    "amazon.titan-text-express-v1",
    "amazon.titan-text-lite-v1",
    "ai21.j2-ultra-v1",
    "ai21.j2-mid-v1",
    "cohere.command-text-v14",
    "meta.llama2-70b-chat-v1",
    "meta.llama2-13b-chat-v1",
];

pub const PROVIDERS: &[ModelProvider] = &[ModelProvider::OpenAI, ModelProvider::Bedrock];

pub fn supported_models(provider: ModelProvider) -> &'static [&'static str] {
    match provider {
        ModelProvider::OpenAI => OPENAI_MODELS,
        ModelProvider::Bedrock => BEDROCK_MODELS,
    }
}

pub fn is_supported(provider: ModelProvider, model: &str) -> bool {
    supported_models(provider).contains(&model)
}

pub fn validate_model(provider: ModelProvider, model: &str) -> Result<(), ValidationError> {
    if is_supported(provider, model) {
        return Ok(());
    }

    Err(ValidationError::UnsupportedModel {
        provider: provider.to_string(),
        model: model.to_string(),
        supported: supported_models(provider)
            .iter()
            .map(|m| m.to_string())
            .collect(),
    })
}
