//! Quest configuration: one YAML file plus environment overrides.
//!
//! Secrets may come from the environment instead of the file: `LLM_API_KEY` replaces
//! `llm.api_key`, `<PERSONA>_BOT_TOKEN` (e.g. `MAIN_BOT_TOKEN`) replaces `bots.<persona>.token`,
//! and `TELEGRAM_API_URL` / `TELOXIDE_API_URL` set the Bot API server.

mod bots;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use llm_client::LlmConfig;
use quest_core::ConfigError;
use quest_engine::{EngineConfig, Registry};
use serde::Deserialize;

pub use bots::{BotConfig, HandlerConfig, RestartConfig, StateConfig, StepConfig, TransitionConfig};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_LOG_FILE: &str = "logs/quest.log";

#[derive(Debug, Clone, Deserialize)]
pub struct QuestConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub telegram_api_url: Option<String>,
    pub bots: BTreeMap<String, BotConfig>,
}

fn default_log_file() -> String {
    DEFAULT_LOG_FILE.to_string()
}

/// Engine and transport tuning; every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Sent when the language model fails or times out.
    pub fallback_reply: String,
    pub history_limit: usize,
    pub resolve_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    /// A chat lane with no events for this long is closed.
    pub lane_idle_secs: u64,
    pub event_buffer: usize,
    pub poll_timeout_secs: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fallback_reply: "Извини, я задумалась. Напиши ещё раз?".to_string(),
            history_limit: 10,
            resolve_timeout_secs: 60,
            shutdown_grace_secs: 5,
            lane_idle_secs: 600,
            event_buffer: quest_telegram::DEFAULT_EVENT_BUFFER,
            poll_timeout_secs: quest_telegram::DEFAULT_POLL_TIMEOUT_SECS,
        }
    }
}

impl EngineSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fallback_reply: self.fallback_reply.clone(),
            history_limit: self.history_limit,
            resolve_timeout: Duration::from_secs(self.resolve_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            lane_idle: Duration::from_secs(self.lane_idle_secs),
        }
    }
}

impl QuestConfig {
    /// Reads `path`, applies environment overrides and validates.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::from_yaml(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parses YAML without overrides or validation.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env(&mut self) {
        if let Some(key) = non_empty_var("LLM_API_KEY") {
            self.llm.api_key = key;
        }
        for (persona, bot) in self.bots.iter_mut() {
            if let Some(token) = non_empty_var(&token_var(persona)) {
                bot.token = token;
            }
        }
        if let Some(url) = non_empty_var("TELEGRAM_API_URL").or_else(|| non_empty_var("TELOXIDE_API_URL")) {
            self.telegram_api_url = Some(url);
        }
    }

    /// Checks values no run could succeed with. Persona wiring is checked by the registry.
    pub fn validate(&self) -> Result<()> {
        self.llm.validate()?;
        if self.bots.is_empty() {
            bail!("no bots configured");
        }
        for (persona, bot) in &self.bots {
            if bot.token.trim().is_empty() {
                bail!(
                    "bots.{}.token is empty (set it in the config file or {})",
                    persona,
                    token_var(persona)
                );
            }
        }
        if self.engine.resolve_timeout_secs == 0 {
            bail!("engine.resolve_timeout_secs must be positive");
        }
        if self.engine.lane_idle_secs == 0 {
            bail!("engine.lane_idle_secs must be positive");
        }
        if self.engine.event_buffer == 0 {
            bail!("engine.event_buffer must be positive");
        }
        Ok(())
    }
}

impl QuestConfig {
    /// Builds and validates every persona. Fails on the first miswired one.
    pub fn build_registry(&self) -> Result<Registry, ConfigError> {
        let mut builder = Registry::builder();
        for (persona, bot) in &self.bots {
            builder.register(bot.to_spec(persona)?)?;
        }
        Ok(builder.build())
    }
}

/// Environment variable holding a persona's bot token: `main` -> `MAIN_BOT_TOKEN`.
pub fn token_var(persona: &str) -> String {
    let name: String = persona
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}_BOT_TOKEN", name)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
