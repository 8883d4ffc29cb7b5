//! [`TelegramGateway`]: one teloxide bot per persona behind [`quest_core::Gateway`].

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use quest_core::{ChatId, EventStream, Gateway, PersonaId, TextFormat, TransportError};
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::TelegramConfig;
use crate::poller::poll_updates;

/// Default `getUpdates` long-poll timeout.
pub const DEFAULT_POLL_TIMEOUT_SECS: u32 = 30;
/// Default capacity of a persona's event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

pub struct TelegramGateway {
    bots: HashMap<PersonaId, teloxide::Bot>,
    poll_timeout_secs: u32,
    event_buffer: usize,
}

impl TelegramGateway {
    /// Builds one bot per persona. Fails on an invalid API URL; tokens are checked on bind.
    pub fn new(configs: impl IntoIterator<Item = (PersonaId, TelegramConfig)>) -> Result<Self> {
        let mut bots = HashMap::new();
        for (persona, config) in configs {
            bots.insert(persona, config.build_bot()?);
        }
        Ok(Self {
            bots,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        })
    }

    pub fn with_poll_timeout(mut self, secs: u32) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    fn bot(&self, persona: &PersonaId) -> Result<&teloxide::Bot, TransportError> {
        self.bots
            .get(persona)
            .ok_or_else(|| TransportError::UnknownPersona(persona.clone()))
    }
}

/// Telegram parse mode for `format`; plain text is sent without one.
fn parse_mode(format: TextFormat) -> Option<ParseMode> {
    match format {
        TextFormat::Html => Some(ParseMode::Html),
        TextFormat::Plain => None,
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    #[instrument(skip(self, cancel), fields(persona = %persona))]
    async fn bind(
        &self,
        persona: &PersonaId,
        cancel: CancellationToken,
    ) -> Result<EventStream, TransportError> {
        let bot = self.bot(persona)?.clone();
        let me = bot
            .get_me()
            .await
            .map_err(|e| TransportError::Bind(format!("getMe failed: {}", e)))?;
        info!(
            username = me.user.username.as_deref().unwrap_or(""),
            bot_id = me.user.id.0,
            "Telegram bot authorized"
        );

        let (tx, rx) = mpsc::channel(self.event_buffer);
        tokio::spawn(poll_updates(
            persona.clone(),
            bot,
            tx,
            self.poll_timeout_secs,
            cancel,
        ));
        Ok(rx)
    }

    async fn send_text(
        &self,
        persona: &PersonaId,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<(), TransportError> {
        let mut request = self
            .bot(persona)?
            .send_message(teloxide::types::ChatId(chat.0), text.to_string());
        if let Some(mode) = parse_mode(format) {
            request = request.parse_mode(mode);
        }
        request
            .await
            .map_err(|e| {
                error!(persona = %persona, chat_id = %chat, error = %e, "sendMessage failed");
                TransportError::Send(e.to_string())
            })?;
        Ok(())
    }

    async fn send_photo(
        &self,
        persona: &PersonaId,
        chat: ChatId,
        path: &Path,
    ) -> Result<(), TransportError> {
        self.bot(persona)?
            .send_photo(
                teloxide::types::ChatId(chat.0),
                InputFile::file(path.to_path_buf()),
            )
            .await
            .map_err(|e| {
                error!(
                    persona = %persona,
                    chat_id = %chat,
                    path = %path.display(),
                    error = %e,
                    "sendPhoto failed"
                );
                TransportError::Send(e.to_string())
            })?;
        Ok(())
    }
}
