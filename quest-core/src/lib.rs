//! # quest-core
//!
//! Core types and traits of the quest engine: [`Gateway`] (chat transport), [`Resolver`]
//! (language model), inbound events, story state names, the error taxonomy and tracing
//! initialization. Transport-agnostic; used by quest-engine, quest-telegram and quest-llm.

pub mod error;
pub mod logger;
pub mod resolver;
pub mod transport;
pub mod types;

pub use error::{ConfigError, HandlerError, QuestError, ResolverError, Result, TransportError};
pub use logger::init_tracing;
pub use resolver::{Next, ResolveRequest, Resolution, Resolver};
pub use transport::{EventStream, Gateway, TextFormat};
pub use types::{ChatId, InboundEvent, PersonaId, StateName, Turn, TurnRole, User};
