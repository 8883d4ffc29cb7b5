//! Language-model connection settings, deserialized from the `llm` section of the quest config.

use anyhow::{bail, Result};
use openai_client::GenerationConfig;
use serde::Deserialize;

/// Gemini's OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub generation: GenerationConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl LlmConfig {
    /// Rejects settings no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("llm.api_key is empty (set it in the config file or LLM_API_KEY)");
        }
        if self.generation.model_name.trim().is_empty() {
            bail!("llm.generation.model_name is empty");
        }
        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                bail!("llm.generation.temperature must be within 0.0..=2.0, got {}", t);
            }
        }
        if self.generation.max_output_tokens == Some(0) {
            bail!("llm.generation.max_output_tokens must be positive");
        }
        Ok(())
    }
}
