//! [`MessageSender`]: the send capability handed to handlers, scoped to one (persona, chat).
//!
//! Criticality is declared by the caller: `critical_*` returns an error that aborts the chain,
//! `best_effort_*` logs the failure and lets the chain continue. Scripted texts go out as HTML;
//! [`MessageSender::best_effort_reply`] sends free-form text without markup.

use std::path::Path;
use std::sync::Arc;

use quest_core::{ChatId, Gateway, HandlerError, PersonaId, TextFormat};
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct MessageSender {
    gateway: Arc<dyn Gateway>,
    persona: PersonaId,
    chat: ChatId,
}

impl MessageSender {
    pub fn new(gateway: Arc<dyn Gateway>, persona: PersonaId, chat: ChatId) -> Self {
        Self {
            gateway,
            persona,
            chat,
        }
    }

    pub fn persona(&self) -> &PersonaId {
        &self.persona
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    /// Sends HTML text; failure aborts the calling chain.
    pub async fn critical_text(&self, text: &str) -> Result<(), HandlerError> {
        match self
            .gateway
            .send_text(&self.persona, self.chat, text, TextFormat::Html)
            .await
        {
            Ok(()) => {
                debug!(persona = %self.persona, chat_id = %self.chat, len = text.len(), "sent text");
                Ok(())
            }
            Err(e) => {
                error!(persona = %self.persona, chat_id = %self.chat, error = %e, "critical text send failed");
                Err(HandlerError::Send(e))
            }
        }
    }

    /// Sends HTML text; failure is logged and swallowed. Returns whether the message went out.
    pub async fn best_effort_text(&self, text: &str) -> bool {
        self.best_effort(text, TextFormat::Html).await
    }

    /// Sends unformatted text (model replies, the fallback reply); failure is logged and swallowed.
    pub async fn best_effort_reply(&self, text: &str) -> bool {
        self.best_effort(text, TextFormat::Plain).await
    }

    async fn best_effort(&self, text: &str, format: TextFormat) -> bool {
        match self
            .gateway
            .send_text(&self.persona, self.chat, text, format)
            .await
        {
            Ok(()) => {
                debug!(persona = %self.persona, chat_id = %self.chat, len = text.len(), format = ?format, "sent text");
                true
            }
            Err(e) => {
                warn!(persona = %self.persona, chat_id = %self.chat, error = %e, "best-effort text send failed");
                false
            }
        }
    }

    /// Sends a photo; failure aborts the calling chain.
    pub async fn critical_photo(&self, path: &Path) -> Result<(), HandlerError> {
        match self.gateway.send_photo(&self.persona, self.chat, path).await {
            Ok(()) => {
                debug!(persona = %self.persona, chat_id = %self.chat, path = %path.display(), "sent photo");
                Ok(())
            }
            Err(e) => {
                error!(
                    persona = %self.persona,
                    chat_id = %self.chat,
                    path = %path.display(),
                    error = %e,
                    "critical photo send failed"
                );
                Err(HandlerError::Send(e))
            }
        }
    }

    /// Sends a photo; failure is logged and swallowed. Returns whether the photo went out.
    pub async fn best_effort_photo(&self, path: &Path) -> bool {
        match self.gateway.send_photo(&self.persona, self.chat, path).await {
            Ok(()) => {
                debug!(persona = %self.persona, chat_id = %self.chat, path = %path.display(), "sent photo");
                true
            }
            Err(e) => {
                warn!(
                    persona = %self.persona,
                    chat_id = %self.chat,
                    path = %path.display(),
                    error = %e,
                    "best-effort photo send failed"
                );
                false
            }
        }
    }
}
