//! Engine: process lifecycle and lanes.
//!
//! One consumption task per persona reads that persona's event stream and routes each event to
//! the lane of its (persona, chat) pair. A lane is an mpsc queue drained by a single task, created
//! on the chat's first event, so events of one chat are dispatched strictly one after another
//! while different chats run in parallel. A lane left idle for [`EngineConfig::lane_idle`]
//! removes itself from the lane map and ends; the chat's next event opens a fresh one.
//!
//! **Lifecycle:** `Initializing -> Running -> ShuttingDown -> Stopped`, published on a
//! [`watch`] channel. Cancelling the engine token stops consumption, interrupts handler delays
//! and drops queued events; [`Engine::run`] returns once tracked tasks finish or the shutdown
//! grace period runs out.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use quest_core::{ConfigError, EventStream, Gateway, InboundEvent, PersonaId, QuestError, Resolver};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{DispatchSettings, Dispatcher, DEFAULT_RESOLVE_TIMEOUT};
use crate::registry::Registry;
use crate::session::{SessionKey, SessionStore, DEFAULT_HISTORY_LIMIT};

/// Default time allowed for in-flight handlers after cancellation.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default time a lane waits for its next event before closing.
pub const DEFAULT_LANE_IDLE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub fallback_reply: String,
    pub history_limit: usize,
    pub resolve_timeout: Duration,
    pub shutdown_grace: Duration,
    pub lane_idle: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_reply: DispatchSettings::default().fallback_reply,
            history_limit: DEFAULT_HISTORY_LIMIT,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            lane_idle: DEFAULT_LANE_IDLE,
        }
    }
}

type LaneSender = mpsc::UnboundedSender<InboundEvent>;
type Lanes = Arc<DashMap<SessionKey, LaneSender>>;

/// Read-only view of the chat lanes currently open.
#[derive(Clone)]
pub struct OpenLanes(Lanes);

impl OpenLanes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Engine {
    dispatcher: Arc<Dispatcher>,
    streams: Vec<(PersonaId, EventStream)>,
    shutdown_grace: Duration,
    lane_idle: Duration,
    lanes: Lanes,
    cancel: CancellationToken,
    state: watch::Sender<EngineState>,
}

impl Engine {
    /// Validates resolver credentials, then binds every registered persona to the gateway.
    ///
    /// Any failure is returned before a single event is consumed; connections bound so far are
    /// cancelled.
    pub async fn initialize(
        registry: Arc<Registry>,
        resolver: Arc<dyn Resolver>,
        gateway: Arc<dyn Gateway>,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> Result<Self, QuestError> {
        let (state, _) = watch::channel(EngineState::Initializing);
        info!(personas = registry.len(), "initializing engine");

        if registry.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "bots".to_string(),
                reason: "no personas registered".to_string(),
            }
            .into());
        }

        resolver.validate_credentials().await.map_err(|e| {
            error!(error = %e, "resolver credential check failed");
            QuestError::Credential(e)
        })?;
        info!("resolver credentials valid");

        let connections = cancel.child_token();
        let mut streams = Vec::with_capacity(registry.len());
        for persona in registry.ids() {
            match gateway.bind(persona, connections.clone()).await {
                Ok(stream) => {
                    info!(persona = %persona, "persona bound to transport");
                    streams.push((persona.clone(), stream));
                }
                Err(source) => {
                    error!(persona = %persona, error = %source, "transport binding failed");
                    connections.cancel();
                    return Err(QuestError::TransportBinding {
                        persona: persona.clone(),
                        source,
                    });
                }
            }
        }

        let sessions = Arc::new(SessionStore::new(config.history_limit));
        let settings = DispatchSettings {
            fallback_reply: config.fallback_reply,
            resolve_timeout: config.resolve_timeout,
        };
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            sessions,
            resolver,
            gateway,
            settings,
            cancel.clone(),
        ));

        Ok(Self {
            dispatcher,
            streams,
            shutdown_grace: config.shutdown_grace,
            lane_idle: config.lane_idle,
            lanes: Arc::new(DashMap::new()),
            cancel,
            state,
        })
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        self.dispatcher.sessions().clone()
    }

    pub fn lanes(&self) -> OpenLanes {
        OpenLanes(self.lanes.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Consumes events until the engine token is cancelled or every event stream has closed.
    pub async fn run(self) {
        let Self {
            dispatcher,
            streams,
            shutdown_grace,
            lane_idle,
            lanes,
            cancel,
            state,
        } = self;

        state.send_replace(EngineState::Running);
        info!(personas = streams.len(), "engine running");

        let lane_tasks = TaskTracker::new();
        let consumers = TaskTracker::new();
        for (persona, stream) in streams {
            consumers.spawn(consume_events(
                persona,
                stream,
                dispatcher.clone(),
                lanes.clone(),
                lane_tasks.clone(),
                lane_idle,
                cancel.clone(),
            ));
        }
        consumers.close();

        tokio::select! {
            _ = cancel.cancelled() => info!("shutdown requested"),
            _ = consumers.wait() => {
                warn!("all event streams closed; shutting down");
                cancel.cancel();
            }
        }

        state.send_replace(EngineState::ShuttingDown);
        debug!(lanes = lanes.len(), "closing lanes");
        lanes.clear();
        lane_tasks.close();
        let drained = async {
            consumers.wait().await;
            lane_tasks.wait().await;
        };
        if tokio::time::timeout(shutdown_grace, drained).await.is_err() {
            warn!(grace = ?shutdown_grace, "lanes still busy after shutdown grace; stopping anyway");
        }

        state.send_replace(EngineState::Stopped);
        info!("engine stopped");
    }
}

/// Reads one persona's events and hands each to its chat lane.
async fn consume_events(
    persona: PersonaId,
    mut events: EventStream,
    dispatcher: Arc<Dispatcher>,
    lanes: Lanes,
    lane_tasks: TaskTracker,
    lane_idle: Duration,
    cancel: CancellationToken,
) {
    info!(persona = %persona, "consuming events");
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    warn!(persona = %persona, "event stream closed");
                    break;
                }
            },
        };

        if event.persona != persona {
            warn!(persona = %persona, event_persona = %event.persona, "event for another persona dropped");
            continue;
        }

        // The entry guard is held across the send so an idle lane cannot remove itself in between.
        let key = SessionKey::new(event.persona.clone(), event.chat);
        let lane = lanes.entry(key.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            lane_tasks.spawn(run_lane(
                key.clone(),
                rx,
                dispatcher.clone(),
                lanes.clone(),
                lane_idle,
                cancel.clone(),
            ));
            tx
        });

        if lane.send(event).is_err() {
            error!(persona = %key.persona, chat_id = %key.chat, "lane closed; event dropped");
        }
    }
    debug!(persona = %persona, "event consumption stopped");
}

/// Dispatches a chat's events one at a time, in arrival order.
async fn run_lane(
    key: SessionKey,
    mut rx: mpsc::UnboundedReceiver<InboundEvent>,
    dispatcher: Arc<Dispatcher>,
    lanes: Lanes,
    idle: Duration,
    cancel: CancellationToken,
) {
    debug!(persona = %key.persona, chat_id = %key.chat, "lane opened");
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = tokio::time::timeout(idle, rx.recv()) => received,
        };
        let event = match received {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                if lanes.remove_if(&key, |_, _| rx.is_empty()).is_some() {
                    debug!(persona = %key.persona, chat_id = %key.chat, idle = ?idle, "lane idle");
                    break;
                }
                continue;
            }
        };
        if let Err(e) = dispatcher.dispatch(&event).await {
            error!(persona = %key.persona, chat_id = %key.chat, error = %e, "event rejected");
        }
    }
    debug!(persona = %key.persona, chat_id = %key.chat, "lane closed");
}
