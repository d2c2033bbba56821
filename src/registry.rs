//! Function id to task handler mapping.
//!
//! Handlers are registered once, before the first run, and invoked by the
//! [`Orchestrator`](crate::Orchestrator) whenever a stage's task names their
//! id in `func`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::workflow::TaskSpec;

/// A unit of work a stage can run.
///
/// `prior` is the result of the task named by the stage's `store` field,
/// when that task ran earlier in the same run and produced a value.
/// Implementations borrow their inputs for the duration of the call only
/// and may be invoked any number of times.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Runs the task and returns its result.
    async fn call(&self, task: &TaskSpec, prior: Option<&Value>) -> Result<Value, HandlerError>;
}

/// Adapts a synchronous closure into a [`TaskHandler`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stagewatch::{CallbackRegistry, SyncHandler};
///
/// let mut registry = CallbackRegistry::new();
/// registry.register("constant", SyncHandler::new(|_task, _prior| Ok(json!(42))));
/// assert!(registry.contains("constant"));
/// ```
pub struct SyncHandler<F>
where
    F: Fn(&TaskSpec, Option<&Value>) -> Result<Value, HandlerError> + Send + Sync,
{
    handler: F,
}

impl<F> SyncHandler<F>
where
    F: Fn(&TaskSpec, Option<&Value>) -> Result<Value, HandlerError> + Send + Sync,
{
    /// Wraps `handler`.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> fmt::Debug for SyncHandler<F>
where
    F: Fn(&TaskSpec, Option<&Value>) -> Result<Value, HandlerError> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> TaskHandler for SyncHandler<F>
where
    F: Fn(&TaskSpec, Option<&Value>) -> Result<Value, HandlerError> + Send + Sync,
{
    async fn call(&self, task: &TaskSpec, prior: Option<&Value>) -> Result<Value, HandlerError> {
        (self.handler)(task, prior)
    }
}

/// Registered handlers, keyed by function id.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `id` and returns the handler it replaced.
    pub fn register<H>(&mut self, id: impl Into<String>, handler: H) -> Option<Arc<dyn TaskHandler>>
    where
        H: TaskHandler + 'static,
    {
        self.register_arc(id, Arc::new(handler))
    }

    /// Registers a shared handler under `id` and returns the handler it
    /// replaced.
    pub fn register_arc(
        &mut self,
        id: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Option<Arc<dyn TaskHandler>> {
        let id = id.into();
        let previous = self.handlers.insert(id.clone(), handler);
        if previous.is_some() {
            tracing::warn!(function_id = %id, "handler replaced");
        }
        previous
    }

    /// Returns the handler registered under `id`.
    pub fn get(&self, id: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(id).cloned()
    }

    /// Returns `true` if a handler is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    /// Returns every registered id, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
