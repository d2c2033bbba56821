//! `remember_servers`: per-server membership check against the store.

use async_trait::async_trait;
use serde_json::Value;
use stagewatch::{HandlerError, TaskHandler, TaskSpec};

use super::{decode_prior, SharedDetector};
use crate::cloud::CloudServers;

/// Walks the fetched servers one by one, remembers each server not seen
/// before in the task's bucket, and returns those as [`CloudServers`].
///
/// Unlike [`DetectChanges`](super::DetectChanges) this keeps one record per
/// server, so servers that disappear are never forgotten.
pub struct RememberServers {
    detector: SharedDetector,
}

impl RememberServers {
    pub fn new(detector: SharedDetector) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl TaskHandler for RememberServers {
    async fn call(&self, task: &TaskSpec, prior: Option<&Value>) -> Result<Value, HandlerError> {
        let fetched: CloudServers = decode_prior(task, prior)?;
        let bucket = task.bucket();

        let mut fresh = Vec::new();
        for server in fetched.servers {
            if self
                .detector
                .is_known(bucket, &server)
                .await
                .map_err(HandlerError::other)?
            {
                tracing::debug!(bucket, server = %server.name, "server already known");
                continue;
            }
            self.detector
                .remember(bucket, &server)
                .await
                .map_err(HandlerError::other)?;
            tracing::info!(bucket, server = %server.name, id = server.id, "server remembered");
            fresh.push(server);
        }

        Ok(serde_json::to_value(CloudServers { servers: fresh })?)
    }
}
