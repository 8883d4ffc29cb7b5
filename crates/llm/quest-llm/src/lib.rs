//! # Quest LLM resolver
//!
//! [`LlmResolver`] implements [`quest_core::Resolver`] on top of any [`LlmClient`]: it turns a
//! [`ResolveRequest`] into chat messages (persona prompt, state goal, recent turns), sends them,
//! and splits the reply into the player-visible text and the advance marker.
//!
//! Successor names come from [`StorySuccessors`], so the model is only offered real edges.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use llm_client::LlmClient;
use prompt::{parse_reply, Advance, ChatMessage, QuestContext};
use quest_core::{
    Next, PersonaId, ResolveRequest, Resolution, Resolver, ResolverError, StateName, Turn,
    TurnRole,
};
use tracing::{debug, error, info, instrument};

/// Successor states per (persona, state), in graph order.
#[derive(Debug, Clone, Default)]
pub struct StorySuccessors {
    edges: HashMap<(PersonaId, StateName), Vec<StateName>>,
}

impl StorySuccessors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, persona: PersonaId, state: StateName, next: Vec<StateName>) {
        self.edges.insert((persona, state), next);
    }

    pub fn get(&self, persona: &PersonaId, state: &StateName) -> &[StateName] {
        self.edges
            .get(&(persona.clone(), state.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub struct LlmResolver {
    client: Arc<dyn LlmClient>,
    successors: StorySuccessors,
}

impl LlmResolver {
    pub fn new(client: Arc<dyn LlmClient>, successors: StorySuccessors) -> Self {
        Self { client, successors }
    }

    /// Chat messages for `request`.
    pub fn messages(&self, request: &ResolveRequest<'_>) -> Vec<ChatMessage> {
        let successors: Vec<&str> = self
            .successors
            .get(request.persona, request.state)
            .iter()
            .map(StateName::as_str)
            .collect();
        let history = request
            .history
            .iter()
            .map(|turn: &Turn| match turn.role {
                TurnRole::User => ChatMessage::user(turn.text.as_str()),
                TurnRole::Persona => ChatMessage::assistant(turn.text.as_str()),
            })
            .collect();
        QuestContext {
            system_prompt: request.system_prompt,
            state: request.state.as_str(),
            goal: request.goal,
            successors: &successors,
            history,
            text: request.text,
        }
        .into_messages()
    }
}

#[async_trait]
impl Resolver for LlmResolver {
    async fn validate_credentials(&self) -> Result<(), ResolverError> {
        self.client.validate().await.map_err(|e| {
            error!(error = %e, "LLM credential check failed");
            ResolverError::Request(format!("{:#}", e))
        })
    }

    #[instrument(skip(self, request), fields(persona = %request.persona, state = %request.state))]
    async fn resolve(&self, request: ResolveRequest<'_>) -> Result<Resolution, ResolverError> {
        let messages = self.messages(&request);
        debug!(message_count = messages.len(), "resolving free text");

        let raw = self
            .client
            .get_llm_response_with_messages(messages)
            .await
            .map_err(|e| ResolverError::Request(format!("{:#}", e)))?;

        let parsed = parse_reply(&raw);
        if parsed.text.is_empty() {
            return Err(ResolverError::EmptyReply);
        }

        // Markers are ignored in states without a goal.
        let advance = match (request.goal, parsed.advance) {
            (Some(_), Some(Advance::Default)) => Some(Next::Default),
            (Some(_), Some(Advance::To(state))) => Some(Next::Named(StateName::new(state))),
            _ => None,
        };
        if let Some(next) = &advance {
            info!(next = ?next, "model reports goal reached");
        }

        Ok(Resolution {
            reply: parsed.text,
            advance,
        })
    }
}
