//! `remember_servers` and `detect_changes` against persisted state.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use stagewatch::{TaskHandler, TaskSpec};
use stagewatch_cli::handlers::{DetectChanges, RememberServers, SharedDetector};
use stagewatch_store::{ChangeDetector, ChangePolicy, InMemoryBackend, RedbBackend, StorageBackend};

fn detector(backend: Arc<dyn StorageBackend>) -> SharedDetector {
    Arc::new(ChangeDetector::new(backend))
}

fn fetched(ids: &[u64]) -> Value {
    let servers: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "id": id, "name": format!("srv-{id}") }))
        .collect();
    json!({ "servers": servers })
}

fn ids(result: &Value) -> Vec<u64> {
    result["servers"]
        .as_array()
        .map(|servers| servers.iter().filter_map(|s| s["id"].as_u64()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn remember_reports_each_server_once() {
    let handler = RememberServers::new(detector(Arc::new(InMemoryBackend::new())));
    let task = TaskSpec::new("remember", "remember_servers")
        .with_store("fetch")
        .with_bucket("hetzner");

    let first = handler.call(&task, Some(&fetched(&[1, 2]))).await.unwrap();
    assert_eq!(ids(&first), vec![1, 2]);

    let second = handler.call(&task, Some(&fetched(&[2, 3]))).await.unwrap();
    assert_eq!(ids(&second), vec![3]);

    // Removed servers are never forgotten on this path.
    let third = handler.call(&task, Some(&fetched(&[1]))).await.unwrap();
    assert!(ids(&third).is_empty());
}

#[tokio::test]
async fn remembered_servers_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.redb");
    let task = TaskSpec::new("remember", "remember_servers")
        .with_store("fetch")
        .with_bucket("hetzner");

    {
        let backend: Arc<dyn StorageBackend> = Arc::new(RedbBackend::open(&path).unwrap());
        let handler = RememberServers::new(detector(backend));
        let result = handler.call(&task, Some(&fetched(&[7]))).await.unwrap();
        assert_eq!(ids(&result), vec![7]);
    }

    let backend: Arc<dyn StorageBackend> = Arc::new(RedbBackend::open(&path).unwrap());
    let handler = RememberServers::new(detector(backend));
    let result = handler.call(&task, Some(&fetched(&[7, 8]))).await.unwrap();
    assert_eq!(ids(&result), vec![8]);
}

#[tokio::test]
async fn detect_uses_task_bucket() {
    let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
    let handler = DetectChanges::new(detector(backend));

    let eu = TaskSpec::new("detect", "detect_changes").with_bucket("eu");
    let us = TaskSpec::new("detect", "detect_changes").with_bucket("us");

    let first = handler.call(&eu, Some(&fetched(&[1]))).await.unwrap();
    assert_eq!(ids(&first), vec![1]);
    let other_bucket = handler.call(&us, Some(&fetched(&[1]))).await.unwrap();
    assert_eq!(ids(&other_bucket), vec![1]);
    let repeat = handler.call(&eu, Some(&fetched(&[1]))).await.unwrap();
    assert!(ids(&repeat).is_empty());
}

#[tokio::test]
async fn content_policy_reports_changed_servers() {
    let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
    let detector: SharedDetector =
        Arc::new(ChangeDetector::new(backend).with_policy(ChangePolicy::Content));
    let handler = DetectChanges::new(detector);
    let task = TaskSpec::new("detect", "detect_changes").with_bucket("hetzner");

    let before = json!({ "servers": [{ "id": 1, "name": "web", "status": "running" }] });
    let after = json!({ "servers": [{ "id": 1, "name": "web", "status": "off" }] });

    handler.call(&task, Some(&before)).await.unwrap();
    let changed = handler.call(&task, Some(&after)).await.unwrap();
    assert_eq!(changed["servers"][0]["status"], json!("off"));
}
