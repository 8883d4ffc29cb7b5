//! Core types: persona and chat identities, story state names, inbound events, conversation turns.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one chatbot persona (the key used in configuration, e.g. `main`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(Arc<str>);

impl PersonaId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonaId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Transport chat identifier (Telegram chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a story state. `start` and `finish` are always present in a persona's graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateName(Arc<str>);

impl StateName {
    pub const START: &'static str = "start";
    pub const FINISH: &'static str = "finish";

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn start() -> Self {
        Self::new(Self::START)
    }

    pub fn finish() -> Self {
        Self::new(Self::FINISH)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_start(&self) -> bool {
        self.as_str() == Self::START
    }

    pub fn is_finish(&self) -> bool {
        self.as_str() == Self::FINISH
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Sender metadata of an inbound event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// One inbound chat event delivered by a persona's transport connection. Consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub persona: PersonaId,
    pub chat: ChatId,
    pub text: String,
    pub user: User,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(persona: PersonaId, chat: ChatId, text: impl Into<String>, user: User) -> Self {
        Self {
            persona,
            chat,
            text: text.into(),
            user,
            received_at: Utc::now(),
        }
    }
}

/// Author of a conversation turn kept as resolver context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnRole {
    User,
    Persona,
}

/// One line of recent conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn persona(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Persona,
            text: text.into(),
        }
    }
}
