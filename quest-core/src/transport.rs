//! Transport gateway abstraction for receiving events and sending text and photos.
//!
//! [`Gateway`] is transport-agnostic; `quest-telegram` implements it via teloxide, tests substitute a mock.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::types::{ChatId, InboundEvent, PersonaId};

/// How a text message is rendered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Scripted texts with `<b>`, `<i>`, `<a>` markup.
    Html,
    /// Sent as is, e.g. language-model replies.
    Plain,
}

/// Inbound events of one persona. The sending side closes when the connection is cancelled.
pub type EventStream = mpsc::Receiver<InboundEvent>;

/// Chat transport: one live event connection per persona, plus sends addressed by (persona, chat).
/// Implementations must be safe for concurrent use from many lanes.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Opens the single live event connection for `persona`. The stream ends once `cancel` fires.
    async fn bind(
        &self,
        persona: &PersonaId,
        cancel: CancellationToken,
    ) -> Result<EventStream, TransportError>;

    /// Sends a text message to `chat` as `persona`.
    async fn send_text(
        &self,
        persona: &PersonaId,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<(), TransportError>;

    /// Sends a local photo file to `chat` as `persona`.
    async fn send_photo(
        &self,
        persona: &PersonaId,
        chat: ChatId,
        path: &Path,
    ) -> Result<(), TransportError>;
}
