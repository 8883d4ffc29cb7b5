//! [`LlmClient`] backed by openai-client with fixed generation parameters.

use anyhow::Result;
use async_trait::async_trait;
use prompt::ChatMessage;
use tracing::{info, instrument};

use super::{chat_message_to_openai, LlmClient, LlmConfig};
use openai_client::GenerationConfig;

#[derive(Clone)]
pub struct OpenAILlmClient {
    client: openai_client::OpenAIClient,
    generation: GenerationConfig,
}

impl OpenAILlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: openai_client::OpenAIClient::new(api_key),
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: openai_client::OpenAIClient::with_base_url(api_key, base_url),
            generation: GenerationConfig::default(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::with_base_url(config.api_key.clone(), config.base_url.clone())
            .with_generation(config.generation.clone())
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }
}

#[async_trait]
impl LlmClient for OpenAILlmClient {
    async fn validate(&self) -> Result<()> {
        let models = self.client.list_models().await?;
        info!(models, model = %self.generation.model_name, "LLM credentials accepted");
        Ok(())
    }

    #[instrument(skip(self, messages), fields(model = %self.generation.model_name))]
    async fn get_llm_response_with_messages(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let openai_messages = messages
            .iter()
            .map(chat_message_to_openai)
            .collect::<Result<Vec<_>>>()?;
        self.client
            .chat_completion(&self.generation, openai_messages)
            .await
    }
}
