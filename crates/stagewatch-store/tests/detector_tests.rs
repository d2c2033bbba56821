//! Integration tests for ChangeDetector.
//!
//! Covers idempotence on unchanged input, identity-based set difference,
//! the per-entity membership path, and behaviour when the backend fails.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stagewatch_store::{
    entity_key, ChangeDetector, ChangePolicy, Entity, InMemoryBackend, SnapshotState,
    StorageBackend, StoreError, SNAPSHOT_KEY,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Server {
    id: u64,
    name: String,
}

impl Entity for Server {
    fn identity(&self) -> String {
        self.id.to_string()
    }
}

fn server(id: u64, name: &str) -> Server {
    Server {
        id,
        name: name.to_string(),
    }
}

/// Backend whose reads or writes can be switched to fail.
#[derive(Default)]
struct FlakyBackend {
    inner: InMemoryBackend,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

fn unavailable(op: &str) -> StoreError {
    StoreError::Backend {
        message: format!("{op} unavailable"),
        source: None,
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable("get"));
        }
        self.inner.get(bucket, key).await
    }

    async fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable("set"));
        }
        self.inner.set(bucket, key, value).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(bucket, key).await
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_keys(bucket).await
    }
}

// ─── Batch diff ─────────────────────────────────────────────────────────────

mod batch_diff {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn first_diff_reports_everything_and_persists() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        let diff = detector.diff("hetzner", &[server(1, "a")]).await.unwrap();

        assert_eq!(diff.delta, vec![server(1, "a")]);
        assert!(matches!(diff.snapshot, SnapshotState::Written));
        assert!(detector
            .backend()
            .get("hetzner", SNAPSHOT_KEY)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn unchanged_collection_yields_empty_delta_without_write() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        let servers = vec![server(1, "a"), server(2, "b")];

        detector.diff("hetzner", &servers).await.unwrap();
        let writes_after_first = detector.backend().write_count();
        let stored_after_first = detector.backend().get("hetzner", SNAPSHOT_KEY).await.unwrap();

        let diff = detector.diff("hetzner", &servers).await.unwrap();
        assert!(diff.is_empty());
        assert!(matches!(diff.snapshot, SnapshotState::Unchanged));
        assert_eq!(detector.backend().write_count(), writes_after_first);
        assert_eq!(
            detector.backend().get("hetzner", SNAPSHOT_KEY).await.unwrap(),
            stored_after_first
        );
    }

    #[tokio::test]
    async fn added_entity_is_exactly_the_delta() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        detector
            .diff("hetzner", &[server(1, "a"), server(3, "c")])
            .await
            .unwrap();

        let diff = detector
            .diff("hetzner", &[server(1, "a"), server(2, "b"), server(3, "c")])
            .await
            .unwrap();
        assert_eq!(diff.delta, vec![server(2, "b")]);
    }

    #[tokio::test]
    async fn added_entity_at_front_is_reported_not_the_first_known_one() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        detector.diff("hetzner", &[server(5, "e")]).await.unwrap();

        let diff = detector
            .diff("hetzner", &[server(4, "d"), server(5, "e")])
            .await
            .unwrap();
        assert_eq!(diff.delta, vec![server(4, "d")]);
    }

    #[tokio::test]
    async fn removed_entity_updates_snapshot_without_delta() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        detector
            .diff("hetzner", &[server(1, "a"), server(2, "b")])
            .await
            .unwrap();

        let diff = detector.diff("hetzner", &[server(1, "a")]).await.unwrap();
        assert!(diff.is_empty());
        assert!(matches!(diff.snapshot, SnapshotState::Written));

        // The removed server comes back: it is new again.
        let diff = detector
            .diff("hetzner", &[server(1, "a"), server(2, "b")])
            .await
            .unwrap();
        assert_eq!(diff.delta, vec![server(2, "b")]);
    }

    #[tokio::test]
    async fn renamed_entity_is_ignored_under_identity_policy() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        detector.diff("hetzner", &[server(1, "a")]).await.unwrap();

        let diff = detector.diff("hetzner", &[server(1, "renamed")]).await.unwrap();
        assert!(diff.is_empty());
        assert!(matches!(diff.snapshot, SnapshotState::Written));
    }

    #[tokio::test]
    async fn renamed_entity_is_reported_under_content_policy() {
        let detector =
            ChangeDetector::new(InMemoryBackend::new()).with_policy(ChangePolicy::Content);
        detector.diff("hetzner", &[server(1, "a")]).await.unwrap();

        let diff = detector.diff("hetzner", &[server(1, "renamed")]).await.unwrap();
        assert_eq!(diff.delta, vec![server(1, "renamed")]);
    }

    #[tokio::test]
    async fn buckets_do_not_share_snapshots() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        detector.diff("eu", &[server(1, "a")]).await.unwrap();

        let diff = detector.diff("us", &[server(1, "a")]).await.unwrap();
        assert_eq!(diff.delta, vec![server(1, "a")]);
    }

    #[tokio::test]
    async fn duplicate_identities_are_reported_once() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        let diff = detector
            .diff("hetzner", &[server(1, "a"), server(1, "a")])
            .await
            .unwrap();
        assert_eq!(diff.delta, vec![server(1, "a")]);
    }
}

// ─── Failure handling ───────────────────────────────────────────────────────

mod failures {
    use super::*;

    #[tokio::test]
    async fn write_failure_still_returns_delta() {
        let backend = FlakyBackend::default();
        backend.fail_writes.store(true, Ordering::SeqCst);
        let detector = ChangeDetector::new(backend);

        let diff = detector.diff("hetzner", &[server(1, "a")]).await.unwrap();
        assert_eq!(diff.delta, vec![server(1, "a")]);
        assert!(diff.is_stale());
    }

    #[tokio::test]
    async fn delta_resurfaces_after_failed_write() {
        let detector = ChangeDetector::new(FlakyBackend::default());
        detector.diff("hetzner", &[server(1, "a")]).await.unwrap();

        detector.backend().fail_writes.store(true, Ordering::SeqCst);
        let failed = detector
            .diff("hetzner", &[server(1, "a"), server(2, "b")])
            .await
            .unwrap();
        assert_eq!(failed.delta, vec![server(2, "b")]);
        assert!(failed.is_stale());

        detector.backend().fail_writes.store(false, Ordering::SeqCst);
        let retried = detector
            .diff("hetzner", &[server(1, "a"), server(2, "b")])
            .await
            .unwrap();
        assert_eq!(retried.delta, vec![server(2, "b")]);
        assert!(matches!(retried.snapshot, SnapshotState::Written));
    }

    #[tokio::test]
    async fn read_failure_reports_everything_and_skips_write() {
        let detector = ChangeDetector::new(FlakyBackend::default());
        detector.diff("hetzner", &[server(1, "a")]).await.unwrap();
        let writes = detector.backend().inner.write_count();

        detector.backend().fail_reads.store(true, Ordering::SeqCst);
        let diff = detector
            .diff("hetzner", &[server(1, "a"), server(2, "b")])
            .await
            .unwrap();
        assert_eq!(diff.delta.len(), 2);
        assert!(diff.is_stale());
        assert_eq!(detector.backend().inner.write_count(), writes);
    }
}

// ─── Per-entity membership ──────────────────────────────────────────────────

mod membership {
    use super::*;

    #[tokio::test]
    async fn seen_after_remember() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        assert!(!detector.seen("hetzner", "1").await.unwrap());

        detector.remember("hetzner", &server(1, "a")).await.unwrap();
        assert!(detector.seen("hetzner", "1").await.unwrap());
        assert!(detector.is_known("hetzner", &server(1, "a")).await.unwrap());
        assert!(!detector.is_known("hetzner", &server(2, "b")).await.unwrap());
    }

    #[tokio::test]
    async fn seen_and_diff_agree_on_identity() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        let servers = vec![server(1, "a"), server(2, "b")];

        let diff = detector.diff("batch", &servers).await.unwrap();
        for entity in &diff.delta {
            assert!(!detector.seen("single", &entity.identity()).await.unwrap());
            detector.remember("single", entity).await.unwrap();
        }

        let renamed = vec![server(1, "x"), server(2, "y")];
        assert!(detector.diff("batch", &renamed).await.unwrap().is_empty());
        for entity in &renamed {
            assert!(detector.is_known("single", entity).await.unwrap());
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Named(String);

    impl Entity for Named {
        fn identity(&self) -> String {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn entity_named_like_snapshot_key_keeps_both_paths_apart() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        let servers = vec![server(1, "a")];
        detector.diff("shared", &servers).await.unwrap();
        let snapshot = detector.backend().get("shared", SNAPSHOT_KEY).await.unwrap();

        let clash = Named(SNAPSHOT_KEY.to_string());
        assert!(!detector.is_known("shared", &clash).await.unwrap());
        detector.remember("shared", &clash).await.unwrap();

        assert_eq!(
            detector.backend().get("shared", SNAPSHOT_KEY).await.unwrap(),
            snapshot
        );
        assert!(detector.seen("shared", SNAPSHOT_KEY).await.unwrap());
        assert!(detector.diff("shared", &servers).await.unwrap().is_empty());

        let mut keys = detector.backend().list_keys("shared").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec![entity_key(SNAPSHOT_KEY), SNAPSHOT_KEY.to_string()]);
    }
}

// ─── Properties ─────────────────────────────────────────────────────────────

mod properties {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn servers() -> impl Strategy<Value = Vec<Server>> {
        prop::collection::btree_map(0u64..50, "[a-z]{1,6}", 0..12).prop_map(
            |map: BTreeMap<u64, String>| {
                map.into_iter()
                    .map(|(id, name)| Server { id, name })
                    .collect()
            },
        )
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    proptest! {
        #[test]
        fn delta_is_set_difference_by_identity(before in servers(), after in servers()) {
            runtime().block_on(async {
                let detector = ChangeDetector::new(InMemoryBackend::new());
                detector.diff("p", &before).await.unwrap();
                let diff = detector.diff("p", &after).await.unwrap();

                let expected: Vec<Server> = after
                    .iter()
                    .filter(|s| !before.iter().any(|b| b.id == s.id))
                    .cloned()
                    .collect();
                prop_assert_eq!(diff.delta, expected);
                Ok(())
            })?;
        }

        #[test]
        fn repeating_a_diff_is_idempotent(fetched in servers()) {
            runtime().block_on(async {
                let detector = ChangeDetector::new(InMemoryBackend::new());
                detector.diff("p", &fetched).await.unwrap();
                let writes = detector.backend().write_count();

                let diff = detector.diff("p", &fetched).await.unwrap();
                prop_assert!(diff.is_empty());
                prop_assert_eq!(detector.backend().write_count(), writes);
                Ok(())
            })?;
        }
    }
}
