//! CLI parser.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "quest")]
#[command(about = "Multi-persona Telegram quest", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the YAML quest config.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect every persona and serve players until interrupted.
    Run,
    /// Load the config and build every persona without connecting.
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["quest", "run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(matches!(cli.command, Commands::Run));
    }

    #[test]
    fn test_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["quest", "check", "--config", "quests/new_year.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("quests/new_year.yaml"));
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["quest"]).is_err());
    }
}
