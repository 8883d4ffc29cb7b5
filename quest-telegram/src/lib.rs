//! # quest-telegram
//!
//! Telegram implementation of [`quest_core::Gateway`]: adapters from teloxide types, per-persona
//! bot config, long-polling event loop, text (HTML) and photo sends.

mod adapters;
mod config;
mod gateway;
mod poller;

pub use adapters::{event_from_update, TelegramMessageWrapper, TelegramUserWrapper};
pub use config::TelegramConfig;
pub use gateway::{TelegramGateway, DEFAULT_EVENT_BUFFER, DEFAULT_POLL_TIMEOUT_SECS};
