//! `write_json`: dump the prior result to `<output_dir>/<bucket>.json`.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use stagewatch::{HandlerError, TaskHandler, TaskSpec};

use super::require_prior;

#[derive(Debug, Clone)]
pub struct WriteJson {
    output_dir: PathBuf,
}

impl WriteJson {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

#[async_trait]
impl TaskHandler for WriteJson {
    async fn call(&self, task: &TaskSpec, prior: Option<&Value>) -> Result<Value, HandlerError> {
        let value = require_prior(task, prior)?;
        let path = self.output_dir.join(format!("{}.json", task.bucket()));
        let bytes = serde_json::to_vec_pretty(value)?;

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(HandlerError::other)?;

        tracing::info!(task = %task.name, path = %path.display(), bytes = bytes.len(), "result written");
        Ok(json!({ "path": path.display().to_string(), "bytes": bytes.len() }))
    }
}
