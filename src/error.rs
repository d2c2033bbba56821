//! Error types for workflow loading, stage transitions and task handlers.
//!
//! Only [`WorkflowError`] is meant to stop a process. A [`TransitionError`]
//! ends the current run early and a [`HandlerError`] only nils the failing
//! stage's result; the scheduler carries on with the next run in both cases.

use thiserror::Error;

/// A workflow definition that cannot be executed as written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Two tasks share a name, so a stage would be bound to both.
    #[error("task '{task}' is defined more than once")]
    DuplicateTask {
        /// The repeated task name.
        task: String,
    },

    /// A stage appears twice in the stage list.
    #[error("stage '{stage}' is listed more than once")]
    DuplicateStage {
        /// The repeated stage name.
        stage: String,
    },

    /// The same event leaves a state towards two different stages.
    #[error("event '{event}' from '{from}' leads to both '{first}' and '{second}'")]
    AmbiguousTransition {
        /// Source state.
        from: String,
        /// Event (transition name).
        event: String,
        /// Target of the first matching edge.
        first: String,
        /// Target of the conflicting edge.
        second: String,
    },

    /// A task's `store` points at a task that does not exist.
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// The dependent task.
        task: String,
        /// The missing task it names.
        dependency: String,
    },

    /// A required field is empty.
    #[error("{context} is missing required field: {field}")]
    MissingField {
        /// What was being validated (`task 'fetch'`, `transition #2`).
        context: String,
        /// The name of the missing field.
        field: &'static str,
    },

    /// Transitions are declared but none leaves `start` on the event it
    /// emits, so every run would end before the first stage.
    #[error("no transition leaves 'start' on event '{event}'")]
    UnreachableStart {
        /// The event emitted in the `start` state.
        event: String,
    },

    /// Function ids referenced by tasks with no registered handler.
    #[error("no handler registered for function id(s): {}", .function_ids.join(", "))]
    UnresolvedHandlers {
        /// The unresolved ids, in definition order.
        function_ids: Vec<String>,
    },
}

/// Why a run stopped before reaching a natural end.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// A task's configured `event` has no edge out of its stage.
    #[error("no transition for event '{event}' from state '{state}'")]
    NoTransition {
        /// The state the run was in.
        state: String,
        /// The configured event that matched nothing.
        event: String,
    },

    /// An edge leads to a stage the workflow does not declare.
    #[error("event '{event}' from '{from}' leads to unknown state '{to}'")]
    UnknownState {
        /// Source state.
        from: String,
        /// Event that selected the edge.
        event: String,
        /// The undeclared target.
        to: String,
    },

    /// The run came back to a stage it already executed.
    #[error("stage '{stage}' was entered twice in the same run")]
    Cycle {
        /// The re-entered stage.
        stage: String,
    },
}

/// A task handler could not produce a result.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The remote endpoint could not be reached or answered with an error.
    #[error("transport error: {message}")]
    Transport {
        /// What failed.
        message: String,
        /// The underlying client error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A payload could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The task lacks something the handler needs (a URL, a dependency).
    #[error("task '{task}' is not usable by this handler: {reason}")]
    InvalidTask {
        /// The task name.
        task: String,
        /// What is missing or wrong.
        reason: String,
    },

    /// A wrapped error from a collaborator such as the store.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps a client error with a description of the failing request.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Boxes any error as [`HandlerError::Other`].
    pub fn other<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(source))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
