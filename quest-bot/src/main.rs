//! quest: multi-persona Telegram quest entry point.

use anyhow::Result;
use clap::Parser;
use quest_bot::{check, run_quest, Cli, Commands, QuestConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = QuestConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run => run_quest(config).await,
        Commands::Check => {
            let registry = check(&config)?;
            println!("{} personas ok", registry.len());
            Ok(())
        }
    }
}
