//! # quest-engine
//!
//! Session orchestration for quest personas.
//!
//! - [`registry`]: personas, story graphs, command and transition handlers bound at registration.
//! - [`session`]: per-(persona, chat) state; the only shared mutable state.
//! - [`dispatcher`]: command / transition / fallback classification of one event.
//! - [`engine`]: lifecycle, per-persona consumption and per-chat lanes.
//! - [`script`], [`sender`]: scripted handler steps and the critical / best-effort send split.

pub mod dispatcher;
pub mod engine;
pub mod registry;
pub mod script;
pub mod sender;
pub mod session;

pub use dispatcher::{parse_command, DispatchReport, DispatchSettings, Dispatcher, Route};
pub use engine::{Engine, EngineConfig, EngineState, OpenLanes};
pub use registry::{PersonaSpec, Registry, RegistryBuilder, StateSpec, StoryGraph};
pub use script::{
    Delivery, HandlerContext, HandlerSpec, Outcome, ScriptHandler, ScriptSpec, StepSpec,
};
pub use sender::MessageSender;
pub use session::{ChatSession, SessionKey, SessionStore};
