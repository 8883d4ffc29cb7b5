//! # OpenAI API client
//!
//! Thin wrapper around [async-openai] for non-streaming chat completion against any
//! OpenAI-compatible endpoint (the quest uses Gemini's compatibility endpoint).
//! Applies [`GenerationConfig`] to every request, checks credentials by listing models, and
//! masks the API key in logs.

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::CreateChatCompletionRequestArgs;
use async_openai::Client;
use serde::{Deserialize, Serialize};

pub use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
};

/// Masks an API key for logging: first 7 chars + `***` + last 4 chars.
/// Keys of 11 bytes or fewer become `***`.
pub fn mask_token(token: &str) -> String {
    const HEAD: usize = 7;
    const TAIL: usize = 4;
    if token.len() <= HEAD + TAIL || !token.is_char_boundary(HEAD) {
        return "***".to_string();
    }
    let tail_start = token.len() - TAIL;
    if !token.is_char_boundary(tail_start) {
        return "***".to_string();
    }
    format!("{}***{}", &token[..HEAD], &token[tail_start..])
}

/// Model and sampling parameters sent with each completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model_name: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_name: "gemini-2.0-flash".to_string(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

/// OpenAI-compatible chat client.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Arc<Client<OpenAIConfig>>,
    /// Kept only for masked logging; `None` when built from an existing client.
    api_key_for_logging: Option<String>,
}

impl OpenAIClient {
    /// Builds a client with the default API base URL.
    pub fn new(api_key: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.clone());
        Self {
            client: Arc::new(Client::with_config(config)),
            api_key_for_logging: Some(api_key),
        }
    }

    /// Builds a client for an OpenAI-compatible endpoint.
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key.clone())
            .with_api_base(base_url);
        Self {
            client: Arc::new(Client::with_config(config)),
            api_key_for_logging: Some(api_key),
        }
    }

    pub fn with_client(client: Client<OpenAIConfig>) -> Self {
        Self {
            client: Arc::new(client),
            api_key_for_logging: None,
        }
    }

    fn masked_key(&self) -> String {
        self.api_key_for_logging
            .as_deref()
            .map(mask_token)
            .unwrap_or_else(|| "***".to_string())
    }

    /// Lists models as a credential check. Returns how many models the key can see.
    pub async fn list_models(&self) -> anyhow::Result<usize> {
        tracing::info!(api_key = %self.masked_key(), "OpenAI list models");
        let models = self.client.models().list().await?;
        tracing::debug!(count = models.data.len(), "OpenAI models listed");
        Ok(models.data.len())
    }

    /// Sends a chat completion request and returns the first choice's text.
    #[allow(deprecated)]
    pub async fn chat_completion(
        &self,
        generation: &GenerationConfig,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> anyhow::Result<String> {
        tracing::info!(
            model = %generation.model_name,
            message_count = messages.len(),
            api_key = %self.masked_key(),
            "OpenAI chat_completion request"
        );

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(generation.model_name.as_str()).messages(messages);
        if let Some(temperature) = generation.temperature {
            args.temperature(temperature);
        }
        if let Some(max_tokens) = generation.max_output_tokens {
            args.max_tokens(max_tokens);
        }
        let request = args.build()?;

        if let Ok(json) = serde_json::to_string(&request) {
            tracing::debug!(request_json = %json, "OpenAI chat_completion request JSON");
        }

        let response = self.client.chat().create(request).await?;

        if let Some(ref u) = response.usage {
            tracing::info!(
                prompt_tokens = u.prompt_tokens,
                completion_tokens = u.completion_tokens,
                total_tokens = u.total_tokens,
                "OpenAI chat_completion usage"
            );
        }

        match response.choices.first() {
            Some(choice) => Ok(choice.message.content.clone().unwrap_or_default()),
            None => anyhow::bail!("No response from OpenAI"),
        }
    }
}
