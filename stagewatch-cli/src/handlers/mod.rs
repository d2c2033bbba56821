//! Built-in task handlers.
//!
//! | func id | handler |
//! |---------|---------|
//! | `http_fetch` | [`HttpFetch`] |
//! | `detect_changes` | [`DetectChanges`] |
//! | `remember_servers` | [`RememberServers`] |
//! | `log_alert` | [`LogAlert`] |
//! | `write_json` | [`WriteJson`] |

mod alert;
mod detect;
mod fetch;
mod remember;
mod write;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use stagewatch::{CallbackRegistry, HandlerError, TaskSpec};
use stagewatch_store::{ChangeDetector, StorageBackend};

use crate::cloud::CLOUD_SERVERS;
use crate::config::{ConfigError, Settings};

pub use alert::LogAlert;
pub use detect::DetectChanges;
pub use fetch::{expand_vars, HttpFetch};
pub use remember::RememberServers;
pub use write::WriteJson;

pub const HTTP_FETCH: &str = "http_fetch";
pub const DETECT_CHANGES: &str = "detect_changes";
pub const REMEMBER_SERVERS: &str = "remember_servers";
pub const LOG_ALERT: &str = "log_alert";
pub const WRITE_JSON: &str = "write_json";

/// Change detector shared by every handler that persists state.
pub type SharedDetector = Arc<ChangeDetector<Arc<dyn StorageBackend>>>;

/// Builds a registry holding every built-in handler, wired to `backend`.
pub fn builtin_registry(
    settings: &Settings,
    backend: Arc<dyn StorageBackend>,
) -> Result<CallbackRegistry, ConfigError> {
    let detector: SharedDetector =
        Arc::new(ChangeDetector::new(backend).with_policy(settings.change_policy));

    let mut registry = CallbackRegistry::new();
    registry.register(HTTP_FETCH, HttpFetch::new(settings.http_timeout)?);
    registry.register(DETECT_CHANGES, DetectChanges::new(Arc::clone(&detector)));
    registry.register(REMEMBER_SERVERS, RememberServers::new(detector));
    registry.register(LOG_ALERT, LogAlert);
    registry.register(WRITE_JSON, WriteJson::new(settings.output_dir.clone()));
    Ok(registry)
}

/// Returns the prior result, or an error naming the missing dependency.
fn require_prior<'a>(task: &TaskSpec, prior: Option<&'a Value>) -> Result<&'a Value, HandlerError> {
    prior.ok_or_else(|| HandlerError::InvalidTask {
        task: task.name.clone(),
        reason: match &task.store {
            Some(dependency) => format!("task '{dependency}' produced no result"),
            None => "no `store` dependency configured".to_string(),
        },
    })
}

/// Decodes the prior result as `T`, which must be the shape `task`
/// announces in `responseStruct` (`CloudServers` when unset).
fn decode_prior<T: DeserializeOwned>(task: &TaskSpec, prior: Option<&Value>) -> Result<T, HandlerError> {
    match task.response_struct.as_deref() {
        None | Some(CLOUD_SERVERS) => {}
        Some(other) => {
            return Err(HandlerError::InvalidTask {
                task: task.name.clone(),
                reason: format!("unsupported responseStruct '{other}'"),
            })
        }
    }
    let value = require_prior(task, prior)?;
    Ok(T::deserialize(value)?)
}
