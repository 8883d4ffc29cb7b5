//! Assembly: config -> registry, resolver, gateway -> engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use llm_client::OpenAILlmClient;
use quest_core::{init_tracing, PersonaId};
use quest_engine::{Engine, Registry};
use quest_llm::{LlmResolver, StorySuccessors};
use quest_telegram::{TelegramConfig, TelegramGateway};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::QuestConfig;

/// Builds every persona without connecting anything.
pub fn check(config: &QuestConfig) -> Result<Registry> {
    let registry = config.build_registry()?;
    for id in registry.ids() {
        let persona = registry.lookup(id)?;
        let commands: Vec<&str> = persona.command_names().collect();
        println!("{}: {} commands ({})", id, commands.len(), commands.join(", "));
    }
    Ok(registry)
}

/// Successor lists of every persona's states, as offered to the model.
pub fn story_successors(registry: &Registry) -> Result<StorySuccessors> {
    let mut successors = StorySuccessors::new();
    for id in registry.ids() {
        let graph = registry.lookup(id)?.graph();
        for state in graph.states() {
            successors.insert(id.clone(), state.clone(), graph.successors(state).to_vec());
        }
    }
    Ok(successors)
}

fn telegram_gateway(config: &QuestConfig) -> Result<TelegramGateway> {
    let connections = config.bots.iter().map(|(persona, bot)| {
        let mut telegram = TelegramConfig::with_token(bot.token.as_str());
        if let Some(url) = &config.telegram_api_url {
            telegram = telegram.with_api_url(url.as_str());
        }
        (PersonaId::new(persona.as_str()), telegram)
    });
    Ok(TelegramGateway::new(connections)?
        .with_event_buffer(config.engine.event_buffer)
        .with_poll_timeout(config.engine.poll_timeout_secs))
}

/// Cancels `cancel` on Ctrl+C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received, shutting down");
        }
        _ = terminate => info!("SIGTERM received, shutting down"),
        _ = cancel.cancelled() => return,
    }
    cancel.cancel();
}

/// Runs the quest until a shutdown signal or until every transport stream ends.
pub async fn run_quest(config: QuestConfig) -> Result<()> {
    init_tracing(&config.log_file)?;
    info!(
        personas = config.bots.len(),
        model = %config.llm.generation.model_name,
        "starting quest"
    );

    let registry = Arc::new(config.build_registry()?);
    let client = Arc::new(OpenAILlmClient::from_config(&config.llm));
    let resolver = Arc::new(LlmResolver::new(client, story_successors(&registry)?));
    let gateway = Arc::new(telegram_gateway(&config)?);

    let cancel = CancellationToken::new();
    let engine = Engine::initialize(
        registry,
        resolver,
        gateway,
        config.engine.engine_config(),
        cancel.clone(),
    )
    .await
    .context("engine initialization failed")?;

    tokio::spawn(shutdown_signal(cancel.clone()));
    engine.run().await;
    cancel.cancel();
    info!("quest stopped");
    Ok(())
}
