//! # quest-bot
//!
//! Runs the quest: loads the YAML [`config`], builds the persona registry, and wires the
//! Telegram gateway and the LLM resolver into the engine ([`runner`]).

pub mod cli;
pub mod config;
pub mod runner;

pub use cli::{Cli, Commands};
pub use config::{token_var, BotConfig, EngineSettings, QuestConfig};
pub use runner::{check, run_quest, story_successors};
