use std::io::Write;

use quest_core::{ConfigError, PersonaId, StateName};
use serial_test::serial;

use super::*;

const MINIMAL: &str = r#"
llm:
  api_key: AIzaSyFileKey123456
bots:
  main:
    token: "111:file"
    placeholders:
      liza_bot_name: "@liza_bot"
    states:
      - name: start
        next: [intro]
      - name: intro
        goal: "The player found the star"
        next: [finish]
      - name: finish
    commands:
      start:
        steps:
          - photo: photos/intro.png
            best_effort: true
          - text: "Write to Liza: {liza_bot_name}"
        then: intro
      restart:
        restart:
          ack:
            text: "Restarted"
            best_effort: true
    transitions:
      finish:
        delay_secs: 10
        steps:
          - text: "The end."
"#;

struct EnvGuard(Vec<&'static str>);

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        Self(vars.iter().map(|(k, _)| *k).collect())
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for k in &self.0 {
            std::env::remove_var(k);
        }
    }
}

fn clear_env() {
    for k in [
        "LLM_API_KEY",
        "MAIN_BOT_TOKEN",
        "TELEGRAM_API_URL",
        "TELOXIDE_API_URL",
    ] {
        std::env::remove_var(k);
    }
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_token_var() {
    assert_eq!(token_var("main"), "MAIN_BOT_TOKEN");
    assert_eq!(token_var("liza-2"), "LIZA_2_BOT_TOKEN");
}

#[test]
fn test_defaults() {
    let config = QuestConfig::from_yaml(MINIMAL).unwrap();
    assert_eq!(config.log_file, DEFAULT_LOG_FILE);
    assert_eq!(config.engine.history_limit, 10);
    assert!(config.telegram_api_url.is_none());

    let engine = config.engine.engine_config();
    assert_eq!(engine.resolve_timeout, Duration::from_secs(60));
    assert_eq!(engine.shutdown_grace, Duration::from_secs(5));
    assert_eq!(engine.lane_idle, Duration::from_secs(600));
}

#[test]
#[serial]
fn test_load_from_file() {
    clear_env();
    let file = write_config(MINIMAL);
    let config = QuestConfig::load(file.path()).unwrap();
    assert_eq!(config.llm.api_key, "AIzaSyFileKey123456");
    assert_eq!(config.bots["main"].token, "111:file");
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let _guard = EnvGuard::set(&[
        ("LLM_API_KEY", "AIzaSyEnvKey654321"),
        ("MAIN_BOT_TOKEN", "222:env"),
        ("TELOXIDE_API_URL", "http://localhost:8081"),
    ]);
    let file = write_config(MINIMAL);
    let config = QuestConfig::load(file.path()).unwrap();
    assert_eq!(config.llm.api_key, "AIzaSyEnvKey654321");
    assert_eq!(config.bots["main"].token, "222:env");
    assert_eq!(
        config.telegram_api_url.as_deref(),
        Some("http://localhost:8081")
    );
}

#[test]
#[serial]
fn test_missing_token_is_rejected() {
    clear_env();
    let file = write_config(&MINIMAL.replace("token: \"111:file\"", "token: \"\""));
    let err = QuestConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("MAIN_BOT_TOKEN"));
}

#[test]
#[serial]
fn test_missing_file_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    assert!(QuestConfig::load(&dir.path().join("absent.yaml")).is_err());
}

#[test]
fn test_build_registry() {
    let config = QuestConfig::from_yaml(MINIMAL).unwrap();
    let registry = config.build_registry().unwrap();
    let main = registry.lookup(&PersonaId::new("main")).unwrap();

    let mut commands: Vec<&str> = main.command_names().collect();
    commands.sort();
    assert_eq!(commands, vec!["restart", "start"]);
    assert_eq!(main.graph().goal(&StateName::new("intro")), Some("The player found the star"));
    assert!(main.transition(&StateName::finish()).is_some());
}

#[test]
fn test_step_needs_exactly_one_action() {
    let raw = MINIMAL.replace(
        "          - text: \"The end.\"",
        "          - text: \"The end.\"\n            pause_secs: 3",
    );
    let config = QuestConfig::from_yaml(&raw).unwrap();
    match config.build_registry() {
        Err(ConfigError::InvalidValue { field, .. }) => {
            assert_eq!(field, "bots.main.transitions.finish.steps[0]")
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("step with two actions accepted"),
    }
}

#[test]
fn test_missing_placeholder_is_rejected() {
    let raw = MINIMAL.replace("      liza_bot_name: \"@liza_bot\"\n", "      other: x\n");
    let config = QuestConfig::from_yaml(&raw).unwrap();
    assert!(matches!(
        config.build_registry(),
        Err(ConfigError::MissingPlaceholder { .. })
    ));
}

#[test]
fn test_unknown_field_in_transition_is_rejected() {
    let raw = MINIMAL.replace("delay_secs: 10", "delay_secs: 10\n        sleep: 3");
    assert!(QuestConfig::from_yaml(&raw).is_err());
}

#[test]
#[serial]
fn test_zero_lane_idle_is_rejected() {
    clear_env();
    let file = write_config(&format!("{}engine:\n  lane_idle_secs: 0\n", MINIMAL));
    let err = QuestConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("lane_idle_secs"));
}
