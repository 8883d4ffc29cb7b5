//! Per-persona Telegram connection settings.

use anyhow::{Context, Result};

/// Telegram connection of one persona.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Bot API server override (e.g. a local Bot API server).
    pub telegram_api_url: Option<String>,
}

impl TelegramConfig {
    pub fn with_token(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            telegram_api_url: None,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.telegram_api_url = Some(url.into());
        self
    }

    /// Builds the teloxide bot for this persona.
    pub fn build_bot(&self) -> Result<teloxide::Bot> {
        let bot = teloxide::Bot::new(&self.bot_token);
        match &self.telegram_api_url {
            Some(url) => {
                let url = reqwest::Url::parse(url)
                    .with_context(|| format!("invalid Telegram API URL: {}", url))?;
                Ok(bot.set_api_url(url))
            }
            None => Ok(bot),
        }
    }
}
