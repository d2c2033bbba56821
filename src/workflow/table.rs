//! Transition lookup.

use std::collections::HashMap;

use super::definition::Transition;

/// `(state, event) -> next state`, built from a definition's transitions.
///
/// When a definition repeats an edge, the first one wins;
/// [`WorkflowDefinition::validate`](super::WorkflowDefinition::validate)
/// rejects repeats that disagree on the target.
///
/// # Examples
///
/// ```
/// use stagewatch::workflow::{Transition, TransitionTable};
///
/// let table = TransitionTable::from_transitions(&[
///     Transition::new("start", "start", "fetch"),
///     Transition::new("fetched", "fetch", "detect"),
/// ]);
///
/// assert_eq!(table.next("fetch", "fetched"), Some("detect"));
/// assert_eq!(table.next("fetch", "fetch"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    edges: HashMap<(String, String), String>,
}

impl TransitionTable {
    /// Builds the table.
    pub fn from_transitions(transitions: &[Transition]) -> Self {
        let mut edges = HashMap::with_capacity(transitions.len());
        for transition in transitions {
            edges
                .entry((transition.from.clone(), transition.name.clone()))
                .or_insert_with(|| transition.to.clone());
        }
        Self { edges }
    }

    /// Returns the state reached by emitting `event` in `state`.
    pub fn next(&self, state: &str, event: &str) -> Option<&str> {
        self.edges
            .get(&(state.to_string(), event.to_string()))
            .map(String::as_str)
    }

    /// Returns the number of distinct edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if the table has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
