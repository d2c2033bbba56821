//! Fixed-interval run loop with cooperative cancellation.
//!
//! [`Scheduler::run`] executes one run immediately, then one per interval,
//! until its [`CancellationToken`] fires. A run is awaited inline, so runs
//! never overlap: ticks that fall due while a slow run is still going are
//! delayed rather than queued up. Cancellation is observed between runs
//! only, which lets an in-flight run finish its stages.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::orchestrator::{Orchestrator, RunReport};
use crate::workflow::WorkflowDefinition;

/// Smallest interval accepted; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Counters collected over the lifetime of a scheduler loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    /// Runs started and finished.
    pub runs: u64,
    /// Runs that stopped on a transition error.
    pub halted: u64,
    /// Stage warnings across all runs.
    pub warnings: u64,
}

impl ScheduleSummary {
    fn record(&mut self, report: &RunReport) {
        self.runs += 1;
        if report.halted.is_some() {
            self.halted += 1;
        }
        self.warnings += report.warnings.len() as u64;
    }
}

/// Runs a workflow on a fixed interval.
#[derive(Debug)]
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    definition: Arc<WorkflowDefinition>,
    interval: Duration,
    max_runs: Option<u64>,
}

impl Scheduler {
    /// Creates a scheduler that runs `definition` every `interval`.
    pub fn new(
        orchestrator: impl Into<Arc<Orchestrator>>,
        definition: impl Into<Arc<WorkflowDefinition>>,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator: orchestrator.into(),
            definition: definition.into(),
            interval,
            max_runs: None,
        }
    }

    /// Stops the loop after `n` runs.
    pub fn with_max_runs(mut self, n: u64) -> Self {
        self.max_runs = Some(n);
        self
    }

    /// Returns the configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs until `cancel` fires or the run limit is reached.
    pub async fn run(&self, cancel: CancellationToken) -> ScheduleSummary {
        let mut summary = ScheduleSummary::default();
        if self.max_runs == Some(0) {
            return summary;
        }

        let mut ticker = tokio::time::interval(self.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!(runs = summary.runs, "scheduler cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let span = tracing::info_span!("run", run = summary.runs + 1);
            let report = self
                .orchestrator
                .run_once(&self.definition)
                .instrument(span)
                .await;
            summary.record(&report);

            if self.max_runs.is_some_and(|max| summary.runs >= max) {
                tracing::info!(runs = summary.runs, "run limit reached");
                break;
            }
        }

        summary
    }
}
