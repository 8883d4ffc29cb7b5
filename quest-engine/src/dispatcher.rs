//! Dispatcher: classifies one inbound event as a command, a resolver-driven transition or a
//! fallback reply, runs the matching handler, and applies the resulting state change.
//!
//! State changes go through the [`SessionStore`] only. A transition is written before the target
//! state's handler runs, so anything reading the store sees the new state while the handler is
//! still waiting out its delay.

use std::sync::Arc;
use std::time::Duration;

use quest_core::{
    ChatId, ConfigError, Gateway, HandlerError, InboundEvent, Next, PersonaId, ResolveRequest,
    Resolution, Resolver, ResolverError, StateName, Turn,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::registry::{Persona, Registry};
use crate::script::{HandlerContext, Outcome};
use crate::sender::MessageSender;
use crate::session::SessionStore;

/// Default resolver timeout.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Sent instead of the resolver reply when the resolver fails.
    pub fallback_reply: String,
    pub resolve_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            fallback_reply: "...".to_string(),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

/// Which path an event took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(String),
    Transition { from: StateName, to: StateName },
    /// `resolved` is false when the default reply was used.
    Fallback { resolved: bool },
}

/// Result of dispatching one event.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub route: Route,
    /// Session state after dispatch.
    pub state: StateName,
    /// Set when a handler chain stopped early; the event is otherwise considered consumed.
    pub error: Option<HandlerError>,
}

/// Extracts the command name from `/name args` or `/name@bot args`.
pub fn parse_command(text: &str) -> Option<&str> {
    let rest = text.trim_start().strip_prefix('/')?;
    let token = rest.split_whitespace().next()?;
    let name = token.split('@').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    sessions: Arc<SessionStore>,
    resolver: Arc<dyn Resolver>,
    gateway: Arc<dyn Gateway>,
    settings: DispatchSettings,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        sessions: Arc<SessionStore>,
        resolver: Arc<dyn Resolver>,
        gateway: Arc<dyn Gateway>,
        settings: DispatchSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            sessions,
            resolver,
            gateway,
            settings,
            cancel,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    fn sender(&self, persona: &PersonaId, chat: ChatId) -> MessageSender {
        MessageSender::new(self.gateway.clone(), persona.clone(), chat)
    }

    fn context(&self, persona: &PersonaId, chat: ChatId, state: StateName) -> HandlerContext {
        HandlerContext::new(self.sender(persona, chat), state, self.cancel.clone())
    }

    /// Dispatches one event. Only an unknown persona is reported as an error; handler and
    /// resolver failures are logged and described in the report.
    #[instrument(skip(self, event), fields(persona = %event.persona, chat_id = %event.chat))]
    pub async fn dispatch(&self, event: &InboundEvent) -> Result<DispatchReport, ConfigError> {
        let persona = self.registry.lookup(&event.persona)?;
        let chat = event.chat;
        self.sessions.touch(persona.id(), chat);
        let current = self.sessions.get_state(persona.id(), chat);

        let command = parse_command(&event.text).filter(|name| persona.command(name).is_some());
        let report = match command {
            Some(name) => self.run_command(persona, chat, name, current).await,
            None => self.resolve_free_text(persona, chat, &event.text, current).await,
        };

        match &report.error {
            None => info!(route = ?report.route, state = %report.state, "event dispatched"),
            Some(e) => warn!(route = ?report.route, state = %report.state, error = %e, "event dispatched with handler failure"),
        }
        Ok(report)
    }

    async fn run_command(
        &self,
        persona: &Persona,
        chat: ChatId,
        name: &str,
        current: StateName,
    ) -> DispatchReport {
        let route = Route::Command(name.to_string());
        let Some(handler) = persona.command(name) else {
            return DispatchReport {
                route,
                state: current,
                error: None,
            };
        };
        info!(command = %name, state = %current, "running command");

        let current = if handler.resets_session() {
            self.sessions.reset(persona.id(), chat);
            info!(from = %current, "session reset to start");
            StateName::start()
        } else {
            current
        };

        let ctx = self.context(persona.id(), chat, current.clone());
        let outcome = match handler.run(&ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(command = %name, error = %e, "command handler failed; state unchanged");
                return DispatchReport {
                    route,
                    state: current,
                    error: Some(e),
                };
            }
        };

        let (state, error) = self.apply_outcome(persona, chat, current, outcome).await;
        DispatchReport { route, state, error }
    }

    async fn resolve_free_text(
        &self,
        persona: &Persona,
        chat: ChatId,
        text: &str,
        current: StateName,
    ) -> DispatchReport {
        let history = self.sessions.recent_turns(persona.id(), chat);
        let request = ResolveRequest {
            persona: persona.id(),
            system_prompt: persona.system_prompt(),
            state: &current,
            goal: persona.graph().goal(&current),
            history: &history,
            text,
        };

        let resolution = match tokio::time::timeout(
            self.settings.resolve_timeout,
            self.resolver.resolve(request),
        )
        .await
        {
            Ok(Ok(r)) if r.reply.trim().is_empty() => Err(ResolverError::EmptyReply),
            Ok(result) => result,
            Err(_) => Err(ResolverError::Timeout(self.settings.resolve_timeout)),
        };

        let sender = self.sender(persona.id(), chat);
        let Resolution { reply, advance } = match resolution {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, state = %current, "resolver failed; sending default reply");
                sender.best_effort_reply(&self.settings.fallback_reply).await;
                return DispatchReport {
                    route: Route::Fallback { resolved: false },
                    state: current,
                    error: None,
                };
            }
        };

        self.sessions.record_turn(persona.id(), chat, Turn::user(text));
        self.sessions
            .record_turn(persona.id(), chat, Turn::persona(reply.as_str()));
        sender.best_effort_reply(&reply).await;

        let target = advance.and_then(|next| self.advance_target(persona, &current, next));
        match target {
            Some(to) => {
                let (state, error) = self.transition(persona, chat, current.clone(), to.clone()).await;
                DispatchReport {
                    route: Route::Transition { from: current, to },
                    state,
                    error,
                }
            }
            None => DispatchReport {
                route: Route::Fallback { resolved: true },
                state: current,
                error: None,
            },
        }
    }

    /// Maps the resolver's verdict onto a configured edge out of `current`.
    fn advance_target(&self, persona: &Persona, current: &StateName, next: Next) -> Option<StateName> {
        let graph = persona.graph();
        let target = match next {
            Next::Default => graph.default_successor(current).cloned(),
            Next::Named(state) if graph.allows(current, &state) => Some(state),
            Next::Named(state) => {
                warn!(from = %current, to = %state, "resolver asked for an unconfigured transition");
                None
            }
        };
        if target.is_none() {
            info!(state = %current, "resolver advance ignored: no successor");
        }
        target
    }

    async fn apply_outcome(
        &self,
        persona: &Persona,
        chat: ChatId,
        current: StateName,
        outcome: Outcome,
    ) -> (StateName, Option<HandlerError>) {
        match outcome {
            Outcome::Stay => (current, None),
            // A repeated `/start` asks for the state the session is already in.
            Outcome::Transition(to) if to == current => (current, None),
            Outcome::Transition(to) => self.transition(persona, chat, current, to).await,
            Outcome::Restart { then } => {
                let start = StateName::start();
                self.sessions.reset(persona.id(), chat);
                info!(from = %current, "session reset to start");
                match then {
                    Some(to) => self.transition(persona, chat, start, to).await,
                    None => (start, None),
                }
            }
        }
    }

    /// Moves the session along `from -> to`, runs the entered state's transition handler after its
    /// delay, and follows any further transition the handler requests.
    async fn transition(
        &self,
        persona: &Persona,
        chat: ChatId,
        from: StateName,
        to: StateName,
    ) -> (StateName, Option<HandlerError>) {
        let mut from = from;
        let mut to = to;
        loop {
            if !persona.graph().allows(&from, &to) {
                warn!(from = %from, to = %to, "transition rejected: not in story graph");
                return (
                    from.clone(),
                    Some(HandlerError::Logic(format!("no transition {} -> {}", from, to))),
                );
            }
            if !self
                .sessions
                .compare_and_set_state(persona.id(), chat, &from, to.clone())
            {
                let actual = self.sessions.get_state(persona.id(), chat);
                warn!(from = %from, to = %to, actual = %actual, "transition lost a race");
                return (
                    actual,
                    Some(HandlerError::Logic(format!("session left {} concurrently", from))),
                );
            }
            info!(from = %from, to = %to, "state transition");

            let Some(binding) = persona.transition(&to) else {
                return (to, None);
            };

            let ctx = self.context(persona.id(), chat, to.clone());
            if !binding.delay.is_zero() {
                info!(state = %to, delay = ?binding.delay, "transition handler scheduled");
                if let Err(e) = ctx.pause(binding.delay).await {
                    info!(state = %to, "transition handler abandoned by shutdown");
                    return (to, Some(e));
                }
            }

            let outcome = match binding.handler.run(&ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(state = %to, error = %e, "transition handler failed");
                    return (to, Some(e));
                }
            };

            match outcome {
                Outcome::Stay => return (to, None),
                Outcome::Transition(next) => {
                    from = to;
                    to = next;
                }
                Outcome::Restart { then } => {
                    let start = StateName::start();
                    self.sessions.reset(persona.id(), chat);
                    info!(from = %to, "session reset to start by transition handler");
                    match then {
                        Some(next) => {
                            from = start;
                            to = next;
                        }
                        None => return (start, None),
                    }
                }
            }
        }
    }
}
