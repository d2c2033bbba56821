//! `detect_changes`: report servers that are new since the last run.

use async_trait::async_trait;
use serde_json::Value;
use stagewatch::{HandlerError, TaskHandler, TaskSpec};

use super::{decode_prior, SharedDetector};
use crate::cloud::CloudServers;

/// Diffs the fetched server list (the `store` dependency's result) against
/// the snapshot kept in the task's bucket and returns the delta as
/// [`CloudServers`].
///
/// A storage failure does not fail the stage: the delta is still returned,
/// so alerts go out even if the same servers may be reported again later.
pub struct DetectChanges {
    detector: SharedDetector,
}

impl DetectChanges {
    pub fn new(detector: SharedDetector) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl TaskHandler for DetectChanges {
    async fn call(&self, task: &TaskSpec, prior: Option<&Value>) -> Result<Value, HandlerError> {
        let fetched: CloudServers = decode_prior(task, prior)?;
        let bucket = task.bucket();

        let diff = self
            .detector
            .diff(bucket, &fetched.servers)
            .await
            .map_err(HandlerError::other)?;

        if diff.is_stale() {
            tracing::warn!(task = %task.name, bucket, "snapshot not persisted; delta may repeat");
        }
        tracing::info!(
            task = %task.name,
            bucket,
            fetched = fetched.servers.len(),
            new = diff.delta.len(),
            "change detection complete"
        );

        Ok(serde_json::to_value(CloudServers {
            servers: diff.delta,
        })?)
    }
}
