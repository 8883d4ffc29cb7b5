//! Scripted handlers: step lists with `{placeholder}` templates, restart composition, and the
//! [`ScriptHandler`] trait the dispatcher runs for commands and state transitions.
//!
//! Handlers are registered as unbound specs ([`HandlerSpec`]) and bound by the registry, which
//! renders every template from the persona's placeholders. A bound [`Script`] carries its final
//! texts as plain fields.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quest_core::{HandlerError, StateName};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::sender::MessageSender;

/// What a handler asks the dispatcher to do with the session once it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Stay,
    Transition(StateName),
    /// Reset to `start`, then optionally transition onward.
    Restart { then: Option<StateName> },
}

/// Per-invocation context: the scoped sender, the state the handler runs in, and shutdown.
pub struct HandlerContext {
    pub sender: MessageSender,
    pub state: StateName,
    cancel: CancellationToken,
}

impl HandlerContext {
    pub fn new(sender: MessageSender, state: StateName, cancel: CancellationToken) -> Self {
        Self {
            sender,
            state,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for `duration` unless shutdown starts first, in which case the chain must stop.
    pub async fn pause(&self, duration: Duration) -> Result<(), HandlerError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HandlerError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// A command or transition handler.
#[async_trait]
pub trait ScriptHandler: Send + Sync {
    async fn run(&self, ctx: &HandlerContext) -> Result<Outcome, HandlerError>;

    /// When true the session is reset to `start` before `run`, so a failing chain leaves it there.
    fn resets_session(&self) -> bool {
        false
    }
}

/// How a send failure affects the rest of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Critical,
    BestEffort,
}

/// One unbound step. Text templates may reference placeholders as `{name}`; `{{` and `}}` are literal braces.
#[derive(Debug, Clone, PartialEq)]
pub enum StepSpec {
    Text { template: String, delivery: Delivery },
    Photo { path: PathBuf, delivery: Delivery },
    Pause(Duration),
}

impl StepSpec {
    pub fn text(template: impl Into<String>) -> Self {
        Self::Text {
            template: template.into(),
            delivery: Delivery::Critical,
        }
    }

    pub fn best_effort_text(template: impl Into<String>) -> Self {
        Self::Text {
            template: template.into(),
            delivery: Delivery::BestEffort,
        }
    }

    pub fn photo(path: impl Into<PathBuf>) -> Self {
        Self::Photo {
            path: path.into(),
            delivery: Delivery::Critical,
        }
    }

    pub fn best_effort_photo(path: impl Into<PathBuf>) -> Self {
        Self::Photo {
            path: path.into(),
            delivery: Delivery::BestEffort,
        }
    }

    pub fn pause(duration: Duration) -> Self {
        Self::Pause(duration)
    }

    pub(crate) fn bind(&self, placeholders: &HashMap<String, String>) -> Result<Step, TemplateError> {
        Ok(match self {
            Self::Text { template, delivery } => Step::Text {
                text: render(template, placeholders)?,
                delivery: *delivery,
            },
            Self::Photo { path, delivery } => Step::Photo {
                path: path.clone(),
                delivery: *delivery,
            },
            Self::Pause(d) => Step::Pause(*d),
        })
    }
}

/// Unbound script: steps in order plus an optional transition requested on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptSpec {
    pub steps: Vec<StepSpec>,
    pub then: Option<StateName>,
}

impl ScriptSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn then(mut self, state: impl Into<StateName>) -> Self {
        self.then = Some(state.into());
        self
    }
}

/// Unbound handler as handed to the registry.
#[derive(Clone)]
pub enum HandlerSpec {
    Script(ScriptSpec),
    /// Sends `ack`, then runs the persona's `start_command` handler as a plain call.
    Restart { ack: StepSpec, start_command: String },
    /// Hand-written handler; `placeholders` are the keys it needs, checked at registration.
    Custom {
        handler: Arc<dyn ScriptHandler>,
        placeholders: Vec<String>,
    },
}

impl From<ScriptSpec> for HandlerSpec {
    fn from(spec: ScriptSpec) -> Self {
        Self::Script(spec)
    }
}

/// Bound step with rendered text.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Text { text: String, delivery: Delivery },
    Photo { path: PathBuf, delivery: Delivery },
    Pause(Duration),
}

impl Step {
    async fn run(&self, ctx: &HandlerContext) -> Result<(), HandlerError> {
        match self {
            Self::Text {
                text,
                delivery: Delivery::Critical,
            } => ctx.sender.critical_text(text).await,
            Self::Text {
                text,
                delivery: Delivery::BestEffort,
            } => {
                ctx.sender.best_effort_text(text).await;
                Ok(())
            }
            Self::Photo {
                path,
                delivery: Delivery::Critical,
            } => ctx.sender.critical_photo(path).await,
            Self::Photo {
                path,
                delivery: Delivery::BestEffort,
            } => {
                ctx.sender.best_effort_photo(path).await;
                Ok(())
            }
            Self::Pause(d) => ctx.pause(*d).await,
        }
    }
}

/// Bound script handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub name: String,
    pub steps: Vec<Step>,
    pub then: Option<StateName>,
}

impl Script {
    pub fn bind(
        name: &str,
        spec: &ScriptSpec,
        placeholders: &HashMap<String, String>,
    ) -> Result<Self, TemplateError> {
        let steps = spec
            .steps
            .iter()
            .map(|s| s.bind(placeholders))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            steps,
            then: spec.then.clone(),
        })
    }
}

#[async_trait]
impl ScriptHandler for Script {
    async fn run(&self, ctx: &HandlerContext) -> Result<Outcome, HandlerError> {
        for (i, step) in self.steps.iter().enumerate() {
            debug!(
                script = %self.name,
                chat_id = %ctx.sender.chat(),
                step = i,
                "running script step"
            );
            step.run(ctx).await?;
        }
        Ok(match &self.then {
            Some(state) => Outcome::Transition(state.clone()),
            None => Outcome::Stay,
        })
    }
}

/// Bound restart: acknowledgement then the start handler, composed by direct call. Runs on a
/// session already reset to `start`; the start handler's outcome is returned unchanged.
pub struct Restart {
    pub ack: Step,
    pub start: Arc<dyn ScriptHandler>,
}

#[async_trait]
impl ScriptHandler for Restart {
    async fn run(&self, ctx: &HandlerContext) -> Result<Outcome, HandlerError> {
        info!(persona = %ctx.sender.persona(), chat_id = %ctx.sender.chat(), "restarting quest");
        self.ack.run(ctx).await?;
        self.start.run(ctx).await
    }

    fn resets_session(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    MissingKey(String),
    Malformed(String),
}

/// Placeholder keys referenced by `template`, in order of appearance.
pub fn template_keys(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut keys = Vec::new();
    walk(template, |part| {
        if let Part::Key(k) = part {
            keys.push(k.to_string());
        }
        Ok(())
    })?;
    Ok(keys)
}

/// Substitutes every `{key}` in `template` from `placeholders`.
pub fn render(
    template: &str,
    placeholders: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    walk(template, |part| {
        match part {
            Part::Literal(c) => out.push(c),
            Part::Key(k) => match placeholders.get(k) {
                Some(v) => out.push_str(v),
                None => return Err(TemplateError::MissingKey(k.to_string())),
            },
        }
        Ok(())
    })?;
    Ok(out)
}

enum Part<'a> {
    Literal(char),
    Key(&'a str),
}

fn walk<'a, F>(template: &'a str, mut f: F) -> Result<(), TemplateError>
where
    F: FnMut(Part<'a>) -> Result<(), TemplateError>,
{
    let mut chars = template.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                f(Part::Literal('{'))?;
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                f(Part::Literal('}'))?;
            }
            '{' => {
                let start = i + 1;
                let mut end = None;
                for (j, d) in chars.by_ref() {
                    if d == '}' {
                        end = Some(j);
                        break;
                    }
                    if d == '{' {
                        return Err(TemplateError::Malformed(format!("nested '{{' at byte {}", j)));
                    }
                }
                let end = end.ok_or_else(|| {
                    TemplateError::Malformed(format!("unclosed '{{' at byte {}", i))
                })?;
                let key = template[start..end].trim();
                if key.is_empty() {
                    return Err(TemplateError::Malformed(format!("empty placeholder at byte {}", i)));
                }
                f(Part::Key(key))?;
            }
            '}' => {
                return Err(TemplateError::Malformed(format!("stray '}}' at byte {}", i)));
            }
            c => f(Part::Literal(c))?,
        }
    }
    Ok(())
}
