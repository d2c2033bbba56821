//! Workflow definitions and the transition table derived from them.
//!
//! - [`definition`] - The declarative model loaded from configuration
//! - [`table`] - `(state, event) -> next state` lookup built per run

pub mod definition;
pub mod table;

pub use definition::{Header, RequestDescriptor, TaskSpec, Transition, WorkflowDefinition};
pub use table::TransitionTable;

/// Reserved initial state of every run.
pub const START: &str = "start";

/// Reserved terminal state. Entering it ends the run.
pub const END: &str = "end";
