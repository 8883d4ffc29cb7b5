//! # LLM client abstraction
//!
//! Defines the [`LlmClient`] trait, its configuration ([`LlmConfig`]) and an
//! OpenAI-compatible implementation. Transport-agnostic; used by quest-llm.

use anyhow::Result;
use async_trait::async_trait;
use openai_client::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use prompt::{ChatMessage, MessageRole};

mod config;
mod openai_llm;

pub use config::{LlmConfig, DEFAULT_BASE_URL};
pub use openai_client::GenerationConfig;
pub use openai_llm::OpenAILlmClient;

/// LLM client interface.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Checks that the configured credentials are accepted.
    async fn validate(&self) -> Result<()>;

    /// Returns the model reply for `messages` (system/user/assistant, in order).
    async fn get_llm_response_with_messages(&self, messages: Vec<ChatMessage>) -> Result<String>;
}

/// Converts a single [`ChatMessage`] into OpenAI API message format.
fn chat_message_to_openai(msg: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let content = msg.content.clone();
    let openai_msg: ChatCompletionRequestMessage = match msg.role {
        MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    };
    Ok(openai_msg)
}
