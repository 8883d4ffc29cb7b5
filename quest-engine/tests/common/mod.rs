//! Shared fixtures for quest-engine integration tests.
//!
//! [`MockGateway`] records every send (and forwards it on a channel so tests can wait for it),
//! can be told to fail photos or selected texts, and lets tests push inbound events per persona.
//! [`MockResolver`] returns scripted resolutions and records what it was asked.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quest_core::{
    ChatId, EventStream, Gateway, InboundEvent, PersonaId, ResolveRequest, Resolution, Resolver,
    ResolverError, StateName, TextFormat, TransportError, User,
};
use quest_engine::{HandlerSpec, PersonaSpec, Registry, ScriptSpec, StateSpec, StepSpec};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One recorded outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        persona: PersonaId,
        chat: ChatId,
        text: String,
    },
    Photo {
        persona: PersonaId,
        chat: ChatId,
        path: PathBuf,
    },
}

impl Sent {
    pub fn chat(&self) -> ChatId {
        match self {
            Sent::Text { chat, .. } | Sent::Photo { chat, .. } => *chat,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Sent::Text { text, .. } => Some(text),
            Sent::Photo { .. } => None,
        }
    }
}

pub struct MockGateway {
    sent: Mutex<Vec<Sent>>,
    sent_tx: mpsc::UnboundedSender<Sent>,
    fail_photos: AtomicBool,
    fail_texts_containing: Mutex<Vec<String>>,
    formats: Mutex<Vec<(String, TextFormat)>>,
    fail_bind: Mutex<Option<PersonaId>>,
    binds: AtomicUsize,
    inbound: Mutex<HashMap<PersonaId, mpsc::Sender<InboundEvent>>>,
}

impl MockGateway {
    /// Creates a gateway and the receiver every successful send is forwarded to.
    pub fn with_receiver() -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let gateway = Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            sent_tx,
            fail_photos: AtomicBool::new(false),
            fail_texts_containing: Mutex::new(Vec::new()),
            formats: Mutex::new(Vec::new()),
            fail_bind: Mutex::new(None),
            binds: AtomicUsize::new(0),
            inbound: Mutex::new(HashMap::new()),
        });
        (gateway, sent_rx)
    }

    pub fn fail_photos(&self) {
        self.fail_photos.store(true, Ordering::SeqCst);
    }

    /// Every text containing `needle` fails to send.
    pub fn fail_texts_containing(&self, needle: &str) {
        self.fail_texts_containing
            .lock()
            .unwrap()
            .push(needle.to_string());
    }

    /// Stops failing photos and texts.
    pub fn heal(&self) {
        self.fail_photos.store(false, Ordering::SeqCst);
        self.fail_texts_containing.lock().unwrap().clear();
    }

    /// Format of the last sent text equal to `text`.
    pub fn format_of(&self, text: &str) -> Option<TextFormat> {
        self.formats
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _)| t == text)
            .map(|(_, f)| *f)
    }

    pub fn fail_bind_for(&self, persona: &str) {
        *self.fail_bind.lock().unwrap() = Some(PersonaId::new(persona));
    }

    pub fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat: ChatId) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| s.chat() == chat).collect()
    }

    /// Texts sent to `chat`, in order.
    pub fn texts_to(&self, chat: ChatId) -> Vec<String> {
        self.sent_to(chat)
            .iter()
            .filter_map(|s| s.text().map(str::to_string))
            .collect()
    }

    /// Delivers an inbound event on `persona`'s bound connection.
    pub async fn push(&self, persona: &str, chat: i64, text: &str) {
        let persona = PersonaId::new(persona);
        let tx = self
            .inbound
            .lock()
            .unwrap()
            .get(&persona)
            .cloned()
            .expect("persona not bound");
        tx.send(InboundEvent::new(persona, ChatId(chat), text, user(chat)))
            .await
            .expect("event stream closed");
    }

    /// Ends `persona`'s event stream.
    pub fn close(&self, persona: &str) {
        self.inbound.lock().unwrap().remove(&PersonaId::new(persona));
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent.clone());
        let _ = self.sent_tx.send(sent);
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn bind(
        &self,
        persona: &PersonaId,
        _cancel: CancellationToken,
    ) -> Result<EventStream, TransportError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        if self.fail_bind.lock().unwrap().as_ref() == Some(persona) {
            return Err(TransportError::Bind("invalid token".to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        self.inbound.lock().unwrap().insert(persona.clone(), tx);
        Ok(rx)
    }

    async fn send_text(
        &self,
        persona: &PersonaId,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<(), TransportError> {
        let fail = self
            .fail_texts_containing
            .lock()
            .unwrap()
            .iter()
            .any(|needle| text.contains(needle.as_str()));
        if fail {
            return Err(TransportError::Send("chat not found".to_string()));
        }
        self.formats
            .lock()
            .unwrap()
            .push((text.to_string(), format));
        self.record(Sent::Text {
            persona: persona.clone(),
            chat,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_photo(
        &self,
        persona: &PersonaId,
        chat: ChatId,
        path: &Path,
    ) -> Result<(), TransportError> {
        if self.fail_photos.load(Ordering::SeqCst) {
            return Err(TransportError::Send(format!("no such file: {}", path.display())));
        }
        self.record(Sent::Photo {
            persona: persona.clone(),
            chat,
            path: path.to_path_buf(),
        });
        Ok(())
    }
}

/// What the resolver was asked.
#[derive(Debug, Clone)]
pub struct ResolveCall {
    pub persona: PersonaId,
    pub state: StateName,
    pub goal: Option<String>,
    pub history_len: usize,
    pub text: String,
}

/// Scripted resolver. With nothing queued it echoes the text back without advancing.
pub struct MockResolver {
    credentials_ok: bool,
    latency: Mutex<Option<Duration>>,
    queued: Mutex<VecDeque<Result<Resolution, ResolverError>>>,
    calls: Mutex<Vec<ResolveCall>>,
}

impl MockResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            credentials_ok: true,
            latency: Mutex::new(None),
            queued: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_bad_credentials() -> Arc<Self> {
        Arc::new(Self {
            credentials_ok: false,
            latency: Mutex::new(None),
            queued: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn then(&self, result: Result<Resolution, ResolverError>) {
        self.queued.lock().unwrap().push_back(result);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self) -> Vec<ResolveCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn validate_credentials(&self) -> Result<(), ResolverError> {
        if self.credentials_ok {
            Ok(())
        } else {
            Err(ResolverError::Request("401 invalid api key".to_string()))
        }
    }

    async fn resolve(&self, request: ResolveRequest<'_>) -> Result<Resolution, ResolverError> {
        self.calls.lock().unwrap().push(ResolveCall {
            persona: request.persona.clone(),
            state: request.state.clone(),
            goal: request.goal.map(str::to_string),
            history_len: request.history.len(),
            text: request.text.to_string(),
        });
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let queued = self.queued.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(Resolution::reply(format!("echo: {}", request.text))))
    }
}

pub fn user(chat: i64) -> User {
    User {
        id: chat,
        username: Some(format!("player{}", chat)),
        first_name: Some("Player".to_string()),
        last_name: None,
    }
}

pub fn event(persona: &str, chat: i64, text: &str) -> InboundEvent {
    InboundEvent::new(PersonaId::new(persona), ChatId(chat), text, user(chat))
}

pub const MAIN_PHOTO: &str = "photos/main_intro.png";
pub const STAR_PHOTO: &str = "photos/star.png";
pub const TREE_PHOTO: &str = "photos/tree.png";
pub const RESTART_ACK: &str = "The game has been restarted";
pub const HELPER_TEXT: &str = "Stuck? Ask me anything.";
pub const LIZA_CLOSING: &str = "Liza made her decision.";
pub const KATYA_CLOSING: &str = "Merry Christmas!";

/// Three personas shaped like the real quest: an intro persona with start/restart and a
/// two-step finale, a secondary persona with a closing text and a tertiary persona with photo
/// commands and a longer closing delay.
pub fn quest_registry() -> Arc<Registry> {
    let start = ScriptSpec::new()
        .step(StepSpec::best_effort_photo(MAIN_PHOTO))
        .step(StepSpec::text("Find Liza: {liza_bot_name}"))
        .step(StepSpec::best_effort_text(HELPER_TEXT))
        .then("intro");

    let main = PersonaSpec::new("main")
        .system_prompt("You are the quest narrator.")
        .placeholder("liza_bot_name", "@liza_bot")
        .placeholder("main_bot_name", "@main_bot")
        .state(StateSpec::new("start").next("intro"))
        .state(
            StateSpec::new("intro")
                .goal("The player says who Liza is")
                .next("finish"),
        )
        .state(StateSpec::new("finish"))
        .command("start", start)
        .command(
            "restart",
            HandlerSpec::Restart {
                ack: StepSpec::best_effort_text(RESTART_ACK),
                start_command: "start".to_string(),
            },
        )
        .transition(
            "finish",
            Duration::from_secs(10),
            ScriptSpec::new()
                .step(StepSpec::best_effort_text("The end."))
                .step(StepSpec::best_effort_text("Share: {main_bot_name}")),
        );

    let liza = PersonaSpec::new("liza")
        .system_prompt("You are Liza.")
        .state(StateSpec::new("start").next("search"))
        .state(
            StateSpec::new("search")
                .goal("The player names the hospital")
                .next("finish"),
        )
        .state(StateSpec::new("finish"))
        .transition(
            "finish",
            Duration::from_secs(10),
            ScriptSpec::new().step(StepSpec::text(LIZA_CLOSING)),
        );

    let katya = PersonaSpec::new("katya")
        .system_prompt("You are Katya.")
        .linear_story(&["start", "search", "finish"])
        .command(
            "sendStarPhoto",
            ScriptSpec::new().step(StepSpec::best_effort_photo(STAR_PHOTO)),
        )
        .command(
            "sendChristmasTreePhoto",
            ScriptSpec::new().step(StepSpec::best_effort_photo(TREE_PHOTO)),
        )
        .transition(
            "finish",
            Duration::from_secs(20),
            ScriptSpec::new().step(StepSpec::best_effort_text(KATYA_CLOSING)),
        );

    let mut builder = Registry::builder();
    builder
        .register(main)
        .and_then(|b| b.register(liza))
        .and_then(|b| b.register(katya))
        .expect("quest registry");
    Arc::new(builder.build())
}
