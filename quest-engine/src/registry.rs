//! Persona registry: story graphs, bound command and transition handlers, placeholders.
//!
//! [`RegistryBuilder::register`] validates and binds one persona at a time and fails fast with a
//! [`ConfigError`]. [`RegistryBuilder::build`] freezes the result; the [`Registry`] is read-only
//! afterwards and shared behind an `Arc` without locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use quest_core::{ConfigError, PersonaId, StateName};
use tracing::info;

use crate::script::{HandlerSpec, Restart, Script, ScriptHandler, TemplateError};

/// One node of a persona's story graph as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSpec {
    pub name: StateName,
    /// Condition the resolver checks to advance out of this state.
    pub goal: Option<String>,
    pub next: Vec<StateName>,
}

impl StateSpec {
    pub fn new(name: impl Into<StateName>) -> Self {
        Self {
            name: name.into(),
            goal: None,
            next: Vec::new(),
        }
    }

    pub fn goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    pub fn next(mut self, state: impl Into<StateName>) -> Self {
        self.next.push(state.into());
        self
    }
}

/// Unbound transition hook: run `handler` when a session enters the state, after `delay`.
#[derive(Clone)]
pub struct TransitionSpec {
    pub delay: Duration,
    pub handler: HandlerSpec,
}

/// Everything needed to register one persona.
#[derive(Clone)]
pub struct PersonaSpec {
    pub id: PersonaId,
    pub system_prompt: String,
    pub placeholders: HashMap<String, String>,
    pub states: Vec<StateSpec>,
    pub commands: Vec<(String, HandlerSpec)>,
    pub transitions: Vec<(StateName, TransitionSpec)>,
}

impl PersonaSpec {
    pub fn new(id: impl Into<PersonaId>) -> Self {
        Self {
            id: id.into(),
            system_prompt: String::new(),
            placeholders: HashMap::new(),
            states: Vec::new(),
            commands: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(key.into(), value.into());
        self
    }

    pub fn placeholders(mut self, placeholders: HashMap<String, String>) -> Self {
        self.placeholders.extend(placeholders);
        self
    }

    pub fn state(mut self, state: StateSpec) -> Self {
        self.states.push(state);
        self
    }

    /// Adds states `names[0] -> names[1] -> ...` as a single path.
    pub fn linear_story(mut self, names: &[&str]) -> Self {
        for (i, name) in names.iter().enumerate() {
            let mut state = StateSpec::new(*name);
            if let Some(next) = names.get(i + 1) {
                state = state.next(*next);
            }
            self.states.push(state);
        }
        self
    }

    pub fn command(mut self, name: impl Into<String>, handler: impl Into<HandlerSpec>) -> Self {
        self.commands.push((name.into(), handler.into()));
        self
    }

    pub fn transition(
        mut self,
        state: impl Into<StateName>,
        delay: Duration,
        handler: impl Into<HandlerSpec>,
    ) -> Self {
        self.transitions.push((
            state.into(),
            TransitionSpec {
                delay,
                handler: handler.into(),
            },
        ));
        self
    }
}

#[derive(Debug, Clone)]
struct StateNode {
    goal: Option<String>,
    next: Vec<StateName>,
}

/// Validated acyclic story graph containing `start` and a terminal `finish`.
#[derive(Debug, Clone)]
pub struct StoryGraph {
    nodes: HashMap<StateName, StateNode>,
}

impl StoryGraph {
    fn build(persona: &PersonaId, states: &[StateSpec]) -> Result<Self, ConfigError> {
        let mut nodes = HashMap::with_capacity(states.len());
        for s in states {
            let node = StateNode {
                goal: s.goal.clone(),
                next: s.next.clone(),
            };
            if nodes.insert(s.name.clone(), node).is_some() {
                return Err(ConfigError::DuplicateState {
                    persona: persona.clone(),
                    state: s.name.clone(),
                });
            }
        }

        for required in [StateName::start(), StateName::finish()] {
            if !nodes.contains_key(&required) {
                return Err(ConfigError::MissingState {
                    persona: persona.clone(),
                    state: required,
                });
            }
        }

        for s in states {
            for next in &s.next {
                if !nodes.contains_key(next) {
                    return Err(ConfigError::UnknownState {
                        persona: persona.clone(),
                        state: next.clone(),
                        referenced_by: format!("state {}", s.name),
                    });
                }
            }
        }

        if nodes
            .get(&StateName::finish())
            .is_some_and(|n| !n.next.is_empty())
        {
            return Err(ConfigError::FinishNotTerminal {
                persona: persona.clone(),
            });
        }

        let graph = Self { nodes };
        graph.check_acyclic(persona)?;
        Ok(graph)
    }

    fn check_acyclic(&self, persona: &PersonaId) -> Result<(), ConfigError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            graph: &'a StoryGraph,
            state: &'a StateName,
            marks: &mut HashMap<&'a StateName, Mark>,
        ) -> Result<(), &'a StateName> {
            match marks.get(state) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(state),
                None => {}
            }
            marks.insert(state, Mark::Visiting);
            for next in graph.successors(state) {
                visit(graph, next, marks)?;
            }
            marks.insert(state, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        // Sorted so the reported state is stable.
        let mut names: Vec<&StateName> = self.nodes.keys().collect();
        names.sort();
        for state in names {
            visit(self, state, &mut marks).map_err(|s| ConfigError::CyclicGraph {
                persona: persona.clone(),
                state: s.clone(),
            })?;
        }
        Ok(())
    }

    /// All states, in no particular order.
    pub fn states(&self) -> impl Iterator<Item = &StateName> {
        self.nodes.keys()
    }

    pub fn contains(&self, state: &StateName) -> bool {
        self.nodes.contains_key(state)
    }

    pub fn goal(&self, state: &StateName) -> Option<&str> {
        self.nodes.get(state).and_then(|n| n.goal.as_deref())
    }

    pub fn successors(&self, state: &StateName) -> &[StateName] {
        self.nodes.get(state).map(|n| n.next.as_slice()).unwrap_or(&[])
    }

    /// The successor the resolver advances to by default.
    pub fn default_successor(&self, state: &StateName) -> Option<&StateName> {
        self.successors(state).first()
    }

    /// Whether `from -> to` is a configured edge.
    pub fn allows(&self, from: &StateName, to: &StateName) -> bool {
        self.successors(from).contains(to)
    }
}

/// Bound transition hook.
#[derive(Clone)]
pub struct TransitionBinding {
    pub delay: Duration,
    pub handler: Arc<dyn ScriptHandler>,
}

/// A registered persona. Immutable after registration.
pub struct Persona {
    id: PersonaId,
    system_prompt: String,
    placeholders: HashMap<String, String>,
    graph: StoryGraph,
    commands: HashMap<String, Arc<dyn ScriptHandler>>,
    transitions: HashMap<StateName, TransitionBinding>,
}

impl Persona {
    pub fn id(&self) -> &PersonaId {
        &self.id
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn placeholder(&self, key: &str) -> Option<&str> {
        self.placeholders.get(key).map(String::as_str)
    }

    pub fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    pub fn command(&self, name: &str) -> Option<&Arc<dyn ScriptHandler>> {
        self.commands.get(name)
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn transition(&self, state: &StateName) -> Option<&TransitionBinding> {
        self.transitions.get(state)
    }

    fn bind(spec: PersonaSpec) -> Result<Self, ConfigError> {
        let PersonaSpec {
            id,
            system_prompt,
            placeholders,
            states,
            commands: command_specs,
            transitions: transition_specs,
        } = spec;

        let graph = StoryGraph::build(&id, &states)?;

        let mut commands: HashMap<String, Arc<dyn ScriptHandler>> = HashMap::new();
        let mut restarts = Vec::new();
        for (name, handler) in command_specs {
            match handler {
                HandlerSpec::Restart { ack, start_command } => {
                    restarts.push((name, ack, start_command));
                }
                other => {
                    let label = format!("command {}", name);
                    let bound = bind_handler(&id, &label, &other, &placeholders, &graph)?;
                    commands.insert(name, bound);
                }
            }
        }

        // Restarts compose with an already bound command, so they go last.
        for (name, ack, start_command) in restarts {
            let start = commands.get(&start_command).cloned().ok_or_else(|| {
                ConfigError::UnknownStartCommand {
                    persona: id.clone(),
                    command: name.clone(),
                    start: start_command.clone(),
                }
            })?;
            let label = format!("command {}", name);
            let ack = ack
                .bind(&placeholders)
                .map_err(|e| template_error(&id, &label, e))?;
            commands.insert(name, Arc::new(Restart { ack, start }));
        }

        let mut transitions = HashMap::new();
        for (state, spec) in transition_specs {
            let label = format!("transition {}", state);
            if !graph.contains(&state) {
                return Err(ConfigError::UnknownState {
                    persona: id.clone(),
                    state,
                    referenced_by: label,
                });
            }
            if let HandlerSpec::Restart { .. } = spec.handler {
                return Err(ConfigError::InvalidValue {
                    field: label,
                    reason: "restart can only be bound as a command".to_string(),
                });
            }
            let handler = bind_handler(&id, &label, &spec.handler, &placeholders, &graph)?;
            transitions.insert(
                state,
                TransitionBinding {
                    delay: spec.delay,
                    handler,
                },
            );
        }

        Ok(Self {
            id,
            system_prompt,
            placeholders,
            graph,
            commands,
            transitions,
        })
    }
}

fn bind_handler(
    persona: &PersonaId,
    label: &str,
    spec: &HandlerSpec,
    placeholders: &HashMap<String, String>,
    graph: &StoryGraph,
) -> Result<Arc<dyn ScriptHandler>, ConfigError> {
    match spec {
        HandlerSpec::Script(script) => {
            if let Some(then) = &script.then {
                if !graph.contains(then) {
                    return Err(ConfigError::UnknownState {
                        persona: persona.clone(),
                        state: then.clone(),
                        referenced_by: label.to_string(),
                    });
                }
            }
            let bound = Script::bind(label, script, placeholders)
                .map_err(|e| template_error(persona, label, e))?;
            Ok(Arc::new(bound))
        }
        HandlerSpec::Custom {
            handler,
            placeholders: keys,
        } => {
            if let Some(key) = keys.iter().find(|k| !placeholders.contains_key(*k)) {
                return Err(ConfigError::MissingPlaceholder {
                    persona: persona.clone(),
                    handler: label.to_string(),
                    key: key.clone(),
                });
            }
            Ok(handler.clone())
        }
        HandlerSpec::Restart { .. } => Err(ConfigError::InvalidValue {
            field: label.to_string(),
            reason: "nested restart".to_string(),
        }),
    }
}

fn template_error(persona: &PersonaId, label: &str, e: TemplateError) -> ConfigError {
    match e {
        TemplateError::MissingKey(key) => ConfigError::MissingPlaceholder {
            persona: persona.clone(),
            handler: label.to_string(),
            key,
        },
        TemplateError::Malformed(reason) => ConfigError::MalformedTemplate {
            persona: persona.clone(),
            handler: label.to_string(),
            reason,
        },
    }
}

/// Collects personas before the engine starts.
#[derive(Default)]
pub struct RegistryBuilder {
    personas: BTreeMap<PersonaId, Persona>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and binds `spec`. Nothing is registered on error.
    pub fn register(&mut self, spec: PersonaSpec) -> Result<&mut Self, ConfigError> {
        if self.personas.contains_key(&spec.id) {
            return Err(ConfigError::DuplicatePersona(spec.id));
        }
        let id = spec.id.clone();
        let persona = Persona::bind(spec)?;
        info!(
            persona = %id,
            commands = persona.commands.len(),
            transitions = persona.transitions.len(),
            states = persona.graph.nodes.len(),
            "persona registered"
        );
        self.personas.insert(id, persona);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            personas: self.personas,
        }
    }
}

/// Frozen set of personas.
pub struct Registry {
    personas: BTreeMap<PersonaId, Persona>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, id: &PersonaId) -> Result<&Persona, ConfigError> {
        self.personas
            .get(id)
            .ok_or_else(|| ConfigError::UnknownPersona(id.clone()))
    }

    /// Persona ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &PersonaId> {
        self.personas.keys()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}
