//! # stagewatch
//!
//! Config-driven stage orchestration. A [`WorkflowDefinition`] names stages,
//! the edges between them, and the task bound to each stage; the
//! [`Orchestrator`] walks that graph as a state machine, invoking the
//! handler registered for each task and handing earlier results to stages
//! that ask for them. The [`Scheduler`] repeats runs on a fixed interval.
//!
//! Persistence and change detection live in the `stagewatch-store` crate;
//! handlers that need them capture a store when they are registered.
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use stagewatch::workflow::{TaskSpec, Transition, WorkflowDefinition};
//! use stagewatch::{CallbackRegistry, Orchestrator, SyncHandler};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut registry = CallbackRegistry::new();
//! registry.register("list", SyncHandler::new(|_task, _prior| Ok(json!([1, 2, 3]))));
//! registry.register(
//!     "count",
//!     SyncHandler::new(|_task, prior| {
//!         let len = prior.and_then(|v| v.as_array()).map_or(0, Vec::len);
//!         Ok(json!(len))
//!     }),
//! );
//!
//! let definition = WorkflowDefinition::new()
//!     .transition(Transition::new("start", "start", "list"))
//!     .transition(Transition::new("listed", "list", "count"))
//!     .task(TaskSpec::new("list", "list").with_event("listed"))
//!     .task(TaskSpec::new("count", "count").with_store("list"));
//! definition.validate().unwrap();
//!
//! let report = Orchestrator::new(registry).run_once(&definition).await;
//! assert_eq!(report.results.get("count"), Some(&json!(3)));
//! assert!(report.is_clean());
//! # }
//! ```

pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod workflow;

pub use error::{HandlerError, TransitionError, WorkflowError};
pub use orchestrator::{
    Orchestrator, RunReport, RunResults, StageWarning, DEFAULT_STAGE_TIMEOUT,
};
pub use registry::{CallbackRegistry, SyncHandler, TaskHandler};
pub use scheduler::{ScheduleSummary, Scheduler};
pub use workflow::{TaskSpec, Transition, WorkflowDefinition};
