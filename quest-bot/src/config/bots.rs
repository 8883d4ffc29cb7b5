//! Persona sections of the config and their conversion into engine [`PersonaSpec`]s.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use quest_core::ConfigError;
use quest_engine::{HandlerSpec, PersonaSpec, ScriptSpec, StateSpec, StepSpec};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub placeholders: HashMap<String, String>,
    pub states: Vec<StateConfig>,
    #[serde(default)]
    pub commands: BTreeMap<String, HandlerConfig>,
    /// Keyed by the state whose entry triggers the handler.
    #[serde(default)]
    pub transitions: BTreeMap<String, TransitionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    pub name: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub next: Vec<String>,
}

/// One step: exactly one of `text`, `photo`, `pause_secs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<PathBuf>,
    #[serde(default)]
    pub pause_secs: Option<u64>,
    /// Failure is logged and the script goes on.
    #[serde(default)]
    pub best_effort: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestartConfig {
    pub ack: StepConfig,
    #[serde(default = "default_start_command")]
    pub start_command: String,
}

fn default_start_command() -> String {
    "start".to_string()
}

/// A command: either a script or a restart.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    /// State to move to once the script completes.
    #[serde(default)]
    pub then: Option<String>,
    #[serde(default)]
    pub restart: Option<RestartConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionConfig {
    #[serde(default)]
    pub delay_secs: u64,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub then: Option<String>,
}

impl StepConfig {
    fn to_spec(&self, field: &str) -> Result<StepSpec, ConfigError> {
        let step = match (&self.text, &self.photo, self.pause_secs) {
            (Some(text), None, None) if self.best_effort => StepSpec::best_effort_text(text.as_str()),
            (Some(text), None, None) => StepSpec::text(text.as_str()),
            (None, Some(path), None) if self.best_effort => StepSpec::best_effort_photo(path.clone()),
            (None, Some(path), None) => StepSpec::photo(path.clone()),
            (None, None, Some(secs)) => StepSpec::pause(Duration::from_secs(secs)),
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "a step needs exactly one of text, photo, pause_secs".to_string(),
                })
            }
        };
        Ok(step)
    }
}

fn script(steps: &[StepConfig], then: &Option<String>, field: &str) -> Result<ScriptSpec, ConfigError> {
    let mut spec = ScriptSpec::new();
    for (i, step) in steps.iter().enumerate() {
        spec = spec.step(step.to_spec(&format!("{}.steps[{}]", field, i))?);
    }
    if let Some(state) = then {
        spec = spec.then(state.as_str());
    }
    Ok(spec)
}

impl HandlerConfig {
    fn to_spec(&self, field: &str) -> Result<HandlerSpec, ConfigError> {
        match &self.restart {
            Some(restart) => {
                if !self.steps.is_empty() || self.then.is_some() {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        reason: "a restart command takes no steps or then".to_string(),
                    });
                }
                Ok(HandlerSpec::Restart {
                    ack: restart.ack.to_spec(&format!("{}.restart.ack", field))?,
                    start_command: restart.start_command.clone(),
                })
            }
            None => Ok(HandlerSpec::Script(script(&self.steps, &self.then, field)?)),
        }
    }
}

impl BotConfig {
    /// Builds the engine spec of persona `id`. Graph and placeholder checks happen on registration.
    pub fn to_spec(&self, id: &str) -> Result<PersonaSpec, ConfigError> {
        let mut spec = PersonaSpec::new(id)
            .system_prompt(self.system_prompt.as_str())
            .placeholders(self.placeholders.clone());

        for state in &self.states {
            let mut s = StateSpec::new(state.name.as_str());
            if let Some(goal) = &state.goal {
                s = s.goal(goal.as_str());
            }
            for next in &state.next {
                s = s.next(next.as_str());
            }
            spec = spec.state(s);
        }

        for (name, handler) in &self.commands {
            let field = format!("bots.{}.commands.{}", id, name);
            spec = spec.command(name.as_str(), handler.to_spec(&field)?);
        }

        for (state, transition) in &self.transitions {
            let field = format!("bots.{}.transitions.{}", id, state);
            spec = spec.transition(
                state.as_str(),
                Duration::from_secs(transition.delay_secs),
                script(&transition.steps, &transition.then, &field)?,
            );
        }

        Ok(spec)
    }
}
