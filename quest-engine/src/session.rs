//! Session store: the single writer of per-(persona, chat) quest state.
//!
//! Sessions are created lazily in state `start` on first access and live until the process ends.
//! Every operation is atomic on its entry; nothing is shared across personas.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use quest_core::{ChatId, PersonaId, StateName, Turn};
use tracing::debug;

/// Default number of turns kept per session for resolver context.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub persona: PersonaId,
    pub chat: ChatId,
}

impl SessionKey {
    pub fn new(persona: PersonaId, chat: ChatId) -> Self {
        Self { persona, chat }
    }
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub state: StateName,
    pub last_activity: DateTime<Utc>,
    /// Oldest first, at most `history_limit` entries.
    pub history: VecDeque<Turn>,
}

impl ChatSession {
    fn new() -> Self {
        Self {
            state: StateName::start(),
            last_activity: Utc::now(),
            history: VecDeque::new(),
        }
    }
}

pub struct SessionStore {
    sessions: DashMap<SessionKey, ChatSession>,
    history_limit: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl SessionStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            history_limit,
        }
    }

    fn key(persona: &PersonaId, chat: ChatId) -> SessionKey {
        SessionKey::new(persona.clone(), chat)
    }

    /// Current state; creates the session in `start` if absent.
    pub fn get_state(&self, persona: &PersonaId, chat: ChatId) -> StateName {
        self.sessions
            .entry(Self::key(persona, chat))
            .or_insert_with(ChatSession::new)
            .state
            .clone()
    }

    pub fn set_state(&self, persona: &PersonaId, chat: ChatId, state: StateName) {
        let mut session = self
            .sessions
            .entry(Self::key(persona, chat))
            .or_insert_with(ChatSession::new);
        debug!(persona = %persona, chat_id = %chat, from = %session.state, to = %state, "set state");
        session.state = state;
    }

    /// Sets `new` only if the current state equals `expected`. Returns whether it did.
    pub fn compare_and_set_state(
        &self,
        persona: &PersonaId,
        chat: ChatId,
        expected: &StateName,
        new: StateName,
    ) -> bool {
        let mut session = self
            .sessions
            .entry(Self::key(persona, chat))
            .or_insert_with(ChatSession::new);
        if session.state != *expected {
            debug!(
                persona = %persona,
                chat_id = %chat,
                expected = %expected,
                actual = %session.state,
                "compare-and-set lost"
            );
            return false;
        }
        session.state = new;
        true
    }

    /// Back to `start` with an empty history, as for a new chat.
    pub fn reset(&self, persona: &PersonaId, chat: ChatId) {
        let mut session = self
            .sessions
            .entry(Self::key(persona, chat))
            .or_insert_with(ChatSession::new);
        debug!(persona = %persona, chat_id = %chat, from = %session.state, "reset session");
        session.state = StateName::start();
        session.history.clear();
    }

    /// Marks inbound activity.
    pub fn touch(&self, persona: &PersonaId, chat: ChatId) {
        self.sessions
            .entry(Self::key(persona, chat))
            .or_insert_with(ChatSession::new)
            .last_activity = Utc::now();
    }

    /// Appends a turn, dropping the oldest past the limit.
    pub fn record_turn(&self, persona: &PersonaId, chat: ChatId, turn: Turn) {
        if self.history_limit == 0 {
            return;
        }
        let mut session = self
            .sessions
            .entry(Self::key(persona, chat))
            .or_insert_with(ChatSession::new);
        session.history.push_back(turn);
        while session.history.len() > self.history_limit {
            session.history.pop_front();
        }
    }

    pub fn recent_turns(&self, persona: &PersonaId, chat: ChatId) -> Vec<Turn> {
        self.sessions
            .get(&Self::key(persona, chat))
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the session without creating it.
    pub fn snapshot(&self, persona: &PersonaId, chat: ChatId) -> Option<ChatSession> {
        self.sessions.get(&Self::key(persona, chat)).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
