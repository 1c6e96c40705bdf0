use crate::agent::{ModelConfig, ModelProvider};
use crate::config::Settings;
use crate::providers::gateway::RetryPolicy;
use crate::providers::sigv4::AwsCredentials;
use crate::providers::{BedrockProvider, OpenAIProvider};
use crate::traits::Provider;
use std::sync::Arc;

/// Builds provider clients for validated model selections.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, model: &ModelConfig) -> Arc<dyn Provider>;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

/// Real provider clients configured from [`Settings`]. Credentials are looked
/// up here but only checked when a call is made.
pub struct DefaultProviderFactory {
    settings: Settings,
}

impl DefaultProviderFactory {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn aws_credentials(&self) -> Option<AwsCredentials> {
        let access_key_id = self.settings.aws_access_key_id()?;
        let secret_access_key = self.settings.aws_secret_access_key()?;
        Some(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token: self.settings.aws_session_token(),
        })
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn create(&self, model: &ModelConfig) -> Arc<dyn Provider> {
        let timeout = self.settings.request_timeout();

        match model.provider {
            ModelProvider::OpenAI => {
                let mut provider =
                    OpenAIProvider::with_timeout(self.settings.openai_api_key(), timeout);
                if let Some(base_url) = &self.settings.openai_base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                Arc::new(provider)
            }
            ModelProvider::Bedrock => {
                let mut provider =
                    BedrockProvider::new(self.aws_credentials(), self.settings.aws_region())
                        .with_timeout(timeout);
                if let Some(endpoint) = &self.settings.bedrock_endpoint {
                    provider = provider.with_endpoint(endpoint.clone());
                }
                Arc::new(provider)
            }
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.settings.max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_client_by_provider() {
        let factory = DefaultProviderFactory::new(Settings::default());
        let openai = factory.create(&ModelConfig::new(ModelProvider::OpenAI, "gpt-4"));
        let bedrock = factory.create(&ModelConfig::new(
            ModelProvider::Bedrock,
            "anthropic.claude-v2",
        ));
        assert_eq!(openai.name(), "openai");
        assert_eq!(bedrock.name(), "bedrock");
        assert!(openai.supports_streaming());
    }

    #[test]
    fn retry_attempts_come_from_settings() {
        let settings = Settings {
            max_retries: 5,
            ..Settings::default()
        };
        let factory = DefaultProviderFactory::new(settings);
        assert_eq!(factory.retry_policy().max_attempts, 5);

        let factory = DefaultProviderFactory::new(Settings {
            max_retries: 0,
            ..Settings::default()
        });
        assert_eq!(factory.retry_policy().max_attempts, 1);
    }
}
