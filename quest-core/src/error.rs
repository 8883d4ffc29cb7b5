use thiserror::Error;

use crate::types::{PersonaId, StateName};

/// Errors that escape to the process boundary. Everything else stays inside one event's lane.
#[derive(Error, Debug)]
pub enum QuestError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[source] ResolverError),

    #[error("Transport binding failed for persona {persona}: {source}")]
    TransportBinding {
        persona: PersonaId,
        #[source]
        source: TransportError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed or incomplete persona, placeholder, command or story-graph wiring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown persona: {0}")]
    UnknownPersona(PersonaId),

    #[error("Persona registered twice: {0}")]
    DuplicatePersona(PersonaId),

    #[error("Persona {persona}: handler {handler} references missing placeholder {{{key}}}")]
    MissingPlaceholder {
        persona: PersonaId,
        handler: String,
        key: String,
    },

    #[error("Persona {persona}: malformed template in handler {handler}: {reason}")]
    MalformedTemplate {
        persona: PersonaId,
        handler: String,
        reason: String,
    },

    #[error("Persona {persona}: story graph is missing required state {state}")]
    MissingState { persona: PersonaId, state: StateName },

    #[error("Persona {persona}: state {state} is declared twice")]
    DuplicateState { persona: PersonaId, state: StateName },

    #[error("Persona {persona}: unknown state {state} referenced by {referenced_by}")]
    UnknownState {
        persona: PersonaId,
        state: StateName,
        referenced_by: String,
    },

    #[error("Persona {persona}: story graph has a cycle through {state}")]
    CyclicGraph { persona: PersonaId, state: StateName },

    #[error("Persona {persona}: terminal state finish must not have successors")]
    FinishNotTerminal { persona: PersonaId },

    #[error("Persona {persona}: restart command {command} refers to unknown start command {start}")]
    UnknownStartCommand {
        persona: PersonaId,
        command: String,
        start: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// A transport bind or send operation failed.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("No transport bound for persona {0}")]
    UnknownPersona(PersonaId),

    #[error("Bind failed: {0}")]
    Bind(String),

    #[error("Send failed: {0}")]
    Send(String),
}

/// The language-model call failed, timed out or returned nothing usable.
#[derive(Error, Debug, Clone)]
pub enum ResolverError {
    #[error("Resolver request failed: {0}")]
    Request(String),

    #[error("Resolver timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Resolver returned an empty reply")]
    EmptyReply,
}

/// A handler chain stopped before completing.
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("Critical send failed: {0}")]
    Send(#[from] TransportError),

    #[error("Handler failed: {0}")]
    Logic(String),

    #[error("Handler cancelled by shutdown")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, QuestError>;
