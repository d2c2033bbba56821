//! `log_alert`: emit one warning per reported entity.

use async_trait::async_trait;
use serde_json::{json, Value};
use stagewatch::{HandlerError, TaskHandler, TaskSpec};

/// Logs every entity in the prior result at warn level and returns
/// `{"alerted": n}`.
///
/// Accepts a `{"servers": [...]}` object, a bare array, or a single value.
/// A missing prior result means there is nothing to report.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlert;

fn entities(prior: &Value) -> Vec<&Value> {
    match prior {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("servers") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![prior],
        },
        other => vec![other],
    }
}

#[async_trait]
impl TaskHandler for LogAlert {
    async fn call(&self, task: &TaskSpec, prior: Option<&Value>) -> Result<Value, HandlerError> {
        let Some(prior) = prior else {
            tracing::debug!(task = %task.name, "nothing to alert on");
            return Ok(json!({ "alerted": 0 }));
        };

        let entities = entities(prior);
        for entity in &entities {
            match entity.get("name").and_then(Value::as_str) {
                Some(name) => tracing::warn!(task = %task.name, entity = name, "new entity detected"),
                None => tracing::warn!(task = %task.name, entity = %entity, "new entity detected"),
            }
        }
        Ok(json!({ "alerted": entities.len() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_servers() {
        let prior = json!({ "servers": [{ "id": 1, "name": "a" }, { "id": 2, "name": "b" }] });
        let result = LogAlert
            .call(&TaskSpec::new("alert", "log_alert"), Some(&prior))
            .await
            .unwrap();
        assert_eq!(result, json!({ "alerted": 2 }));
    }

    #[tokio::test]
    async fn missing_prior_alerts_nothing() {
        let result = LogAlert
            .call(&TaskSpec::new("alert", "log_alert"), None)
            .await
            .unwrap();
        assert_eq!(result, json!({ "alerted": 0 }));
    }

    #[test]
    fn entity_shapes() {
        assert_eq!(entities(&json!([1, 2, 3])).len(), 3);
        assert_eq!(entities(&json!({ "servers": [] })).len(), 0);
        assert_eq!(entities(&json!({ "id": 7 })).len(), 1);
        assert_eq!(entities(&json!("web-1")).len(), 1);
        assert!(entities(&Value::Null).is_empty());
    }
}
