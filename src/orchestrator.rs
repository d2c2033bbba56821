//! State-machine stage driver.
//!
//! [`Orchestrator::run_once`] walks a [`WorkflowDefinition`] from the
//! reserved [`START`] state. In every state it runs the task bound to the
//! stage (if any), records the result, and follows the edge selected by the
//! event the task emits. The run stops when it enters [`END`], when the
//! current state has no edge for the emitted event, or when a
//! [`TransitionError`] halts it.
//!
//! Handler problems never end a run. An unregistered function id, a
//! handler error, and a handler that outlives the stage timeout each leave
//! a nil result and a [`StageWarning`], and the run moves on.
//!
//! A definition without transitions runs its stage list in order instead.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{TransitionError, WorkflowError};
use crate::registry::CallbackRegistry;
use crate::workflow::{TaskSpec, TransitionTable, WorkflowDefinition, END, START};

/// Default bound on a single handler invocation.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Results of one run, keyed by task name, in execution order.
///
/// An entry is `None` when the task ran but produced nothing usable.
/// Entries are write-once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResults {
    entries: IndexMap<String, Option<Value>>,
}

impl RunResults {
    /// Creates an empty result table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result of `task`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Cycle`] if `task` already has an entry.
    pub fn record(&mut self, task: &str, value: Option<Value>) -> Result<(), TransitionError> {
        if self.entries.contains_key(task) {
            return Err(TransitionError::Cycle {
                stage: task.to_string(),
            });
        }
        self.entries.insert(task.to_string(), value);
        Ok(())
    }

    /// Returns the value produced by `task`, if it ran and produced one.
    pub fn get(&self, task: &str) -> Option<&Value> {
        self.entries.get(task).and_then(Option::as_ref)
    }

    /// Returns `true` if `task` has an entry, nil or not.
    pub fn contains(&self, task: &str) -> bool {
        self.entries.contains_key(task)
    }

    /// Returns `true` if `task` ran and produced nothing.
    pub fn is_nil(&self, task: &str) -> bool {
        matches!(self.entries.get(task), Some(None))
    }

    /// Iterates over entries in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no task has run.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A stage problem that did not stop the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageWarning {
    /// No handler is registered for the task's function id.
    UnregisteredHandler {
        /// Stage (task) name.
        stage: String,
        /// The unknown function id.
        function_id: String,
    },
    /// The handler returned an error.
    HandlerFailed {
        /// Stage (task) name.
        stage: String,
        /// Rendered handler error.
        error: String,
    },
    /// The handler did not finish within the stage timeout.
    TimedOut {
        /// Stage (task) name.
        stage: String,
        /// The timeout that elapsed.
        after: Duration,
    },
}

impl StageWarning {
    /// Returns the stage the warning belongs to.
    pub fn stage(&self) -> &str {
        match self {
            Self::UnregisteredHandler { stage, .. }
            | Self::HandlerFailed { stage, .. }
            | Self::TimedOut { stage, .. } => stage,
        }
    }
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnregisteredHandler { stage, function_id } => {
                write!(f, "stage '{stage}': no handler registered for '{function_id}'")
            }
            Self::HandlerFailed { stage, error } => write!(f, "stage '{stage}' failed: {error}"),
            Self::TimedOut { stage, after } => {
                write!(f, "stage '{stage}' timed out after {after:?}")
            }
        }
    }
}

/// Everything one run produced.
#[derive(Debug)]
pub struct RunReport {
    /// Per-task results.
    pub results: RunResults,
    /// Stages entered, in order. Reserved states are not listed.
    pub visited: Vec<String>,
    /// Non-fatal stage problems.
    pub warnings: Vec<StageWarning>,
    /// The state the run ended in.
    pub terminal: String,
    /// Why the run stopped early, if it did.
    pub halted: Option<TransitionError>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl RunReport {
    /// Returns `true` if the run neither halted nor recorded warnings.
    pub fn is_clean(&self) -> bool {
        self.halted.is_none() && self.warnings.is_empty()
    }
}

/// Drives workflow runs against a [`CallbackRegistry`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stagewatch::workflow::{TaskSpec, Transition, WorkflowDefinition};
/// use stagewatch::{CallbackRegistry, Orchestrator, SyncHandler};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut registry = CallbackRegistry::new();
/// registry.register("hello", SyncHandler::new(|_task, _prior| Ok(json!("hi"))));
///
/// let definition = WorkflowDefinition::new()
///     .transition(Transition::new("start", "start", "greet"))
///     .task(TaskSpec::new("greet", "hello"));
///
/// let report = Orchestrator::new(registry).run_once(&definition).await;
/// assert_eq!(report.visited, vec!["greet".to_string()]);
/// assert_eq!(report.results.get("greet"), Some(&json!("hi")));
/// # }
/// ```
#[derive(Debug)]
pub struct Orchestrator {
    registry: CallbackRegistry,
    stage_timeout: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator with [`DEFAULT_STAGE_TIMEOUT`].
    pub fn new(registry: CallbackRegistry) -> Self {
        Self {
            registry,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    /// Sets the bound on each handler invocation.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Returns the stage timeout.
    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    /// Returns the handler registry.
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Returns the function ids `definition` references that have no
    /// registered handler, in definition order.
    pub fn unresolved_handlers(&self, definition: &WorkflowDefinition) -> Vec<String> {
        definition
            .function_ids()
            .into_iter()
            .filter(|id| !self.registry.contains(id))
            .map(str::to_string)
            .collect()
    }

    /// Fails with [`WorkflowError::UnresolvedHandlers`] if any function id in
    /// `definition` lacks a handler.
    pub fn ensure_handlers(&self, definition: &WorkflowDefinition) -> Result<(), WorkflowError> {
        let function_ids = self.unresolved_handlers(definition);
        if function_ids.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::UnresolvedHandlers { function_ids })
        }
    }

    /// Executes one run of `definition`.
    pub async fn run_once(&self, definition: &WorkflowDefinition) -> RunReport {
        let started = Instant::now();
        let mut run = Run::default();

        let terminal = if definition.is_sequential() {
            self.run_sequential(definition, &mut run).await
        } else {
            self.run_state_machine(definition, &mut run).await
        };

        let report = RunReport {
            results: run.results,
            visited: run.visited,
            warnings: run.warnings,
            terminal,
            halted: run.halted,
            elapsed: started.elapsed(),
        };

        match &report.halted {
            Some(err) => tracing::warn!(
                terminal = %report.terminal,
                stages = report.visited.len(),
                error = %err,
                "run halted"
            ),
            None => tracing::info!(
                terminal = %report.terminal,
                stages = report.visited.len(),
                warnings = report.warnings.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "run finished"
            ),
        }
        report
    }

    async fn run_state_machine(&self, definition: &WorkflowDefinition, run: &mut Run) -> String {
        let table = TransitionTable::from_transitions(&definition.transitions);
        let mut entered = HashSet::new();
        let mut state = START.to_string();

        loop {
            if state == END {
                return state;
            }
            if !entered.insert(state.clone()) {
                run.halted = Some(TransitionError::Cycle {
                    stage: state.clone(),
                });
                return state;
            }
            if state != START {
                run.visited.push(state.clone());
            }

            let task = definition.find_task(&state);
            if let Some(task) = task {
                if let Err(err) = self.execute(task, run).await {
                    run.halted = Some(err);
                    return state;
                }
            }

            let event = task.map_or(state.as_str(), TaskSpec::emitted_event);
            let Some(next) = table.next(&state, event) else {
                if let Some(explicit) = task.and_then(|task| task.event.as_deref()) {
                    run.halted = Some(TransitionError::NoTransition {
                        state: state.clone(),
                        event: explicit.to_string(),
                    });
                } else if state == START {
                    run.halted = Some(TransitionError::NoTransition {
                        state: state.clone(),
                        event: event.to_string(),
                    });
                } else {
                    tracing::debug!(state = %state, event, "no outgoing edge; run complete");
                }
                return state;
            };

            if !definition.is_known_state(next) {
                run.halted = Some(TransitionError::UnknownState {
                    from: state.clone(),
                    event: event.to_string(),
                    to: next.to_string(),
                });
                return state;
            }

            tracing::debug!(from = %state, event, to = next, "transition");
            state = next.to_string();
        }
    }

    async fn run_sequential(&self, definition: &WorkflowDefinition, run: &mut Run) -> String {
        let mut state = START.to_string();
        for stage in &definition.stages {
            if stage == START || stage == END {
                continue;
            }
            state = stage.clone();
            run.visited.push(stage.clone());

            if let Some(task) = definition.find_task(stage) {
                if let Err(err) = self.execute(task, run).await {
                    run.halted = Some(err);
                    return state;
                }
            }
        }
        state
    }

    /// Runs `task` and records its result. Handler problems become
    /// warnings; only a second write for the same task is an error.
    async fn execute(&self, task: &TaskSpec, run: &mut Run) -> Result<(), TransitionError> {
        let Some(handler) = self.registry.get(&task.function_id) else {
            tracing::warn!(
                stage = %task.name,
                function_id = %task.function_id,
                "no handler registered; skipping stage"
            );
            run.warnings.push(StageWarning::UnregisteredHandler {
                stage: task.name.clone(),
                function_id: task.function_id.clone(),
            });
            return run.results.record(&task.name, None);
        };

        let prior = task
            .store
            .as_deref()
            .and_then(|dependency| run.results.get(dependency));
        let outcome = tokio::time::timeout(self.stage_timeout, handler.call(task, prior)).await;

        let value = match outcome {
            Ok(Ok(value)) => {
                tracing::debug!(stage = %task.name, function_id = %task.function_id, "stage completed");
                Some(value)
            }
            Ok(Err(err)) => {
                tracing::warn!(stage = %task.name, error = %err, "stage failed");
                run.warnings.push(StageWarning::HandlerFailed {
                    stage: task.name.clone(),
                    error: err.to_string(),
                });
                None
            }
            Err(_) => {
                tracing::warn!(
                    stage = %task.name,
                    timeout_ms = self.stage_timeout.as_millis() as u64,
                    "stage timed out"
                );
                run.warnings.push(StageWarning::TimedOut {
                    stage: task.name.clone(),
                    after: self.stage_timeout,
                });
                None
            }
        };
        run.results.record(&task.name, value)
    }
}

#[derive(Default)]
struct Run {
    results: RunResults,
    visited: Vec<String>,
    warnings: Vec<StageWarning>,
    halted: Option<TransitionError>,
}
