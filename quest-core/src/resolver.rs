//! Language-model resolver abstraction for unscripted free text.

use async_trait::async_trait;

use crate::error::ResolverError;
use crate::types::{PersonaId, StateName, Turn};

/// Everything the resolver sees for one free-text message.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub persona: &'a PersonaId,
    /// Persona character prompt.
    pub system_prompt: &'a str,
    pub state: &'a StateName,
    /// Condition that completes `state`, if the state can be advanced by conversation.
    pub goal: Option<&'a str>,
    /// Oldest first.
    pub history: &'a [Turn],
    pub text: &'a str,
}

/// Which successor the resolver asks for when the state's goal is satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// The state's first configured successor.
    Default,
    Named(StateName),
}

/// Reply text plus the resolver's verdict on the current state's goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub reply: String,
    pub advance: Option<Next>,
}

impl Resolution {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            advance: None,
        }
    }

    pub fn advancing(text: impl Into<String>, next: Next) -> Self {
        Self {
            reply: text.into(),
            advance: Some(next),
        }
    }
}

/// Opaque remote text generation. No determinism, latency bound or retry behaviour is assumed.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Checked once before any transport connection opens; failure is fatal.
    async fn validate_credentials(&self) -> Result<(), ResolverError>;

    async fn resolve(&self, request: ResolveRequest<'_>) -> Result<Resolution, ResolverError>;
}
