//! Change detection against persisted snapshots.
//!
//! [`ChangeDetector`] answers one question per bucket and run: which of the
//! entities fetched just now has nobody seen before? It offers two paths
//! over the same [`StorageBackend`]:
//!
//! - **Batch**: [`diff`](ChangeDetector::diff) compares a whole fetched
//!   collection with the snapshot persisted under [`SNAPSHOT_KEY`] and
//!   returns the delta.
//! - **Per entity**: [`seen`](ChangeDetector::seen),
//!   [`is_known`](ChangeDetector::is_known) and
//!   [`remember`](ChangeDetector::remember) keep one key per entity
//!   identity, under [`entity_key`].
//!
//! Both paths decide "known" through [`Entity::identity`]. What counts as
//! a change is the [`ChangePolicy`] chosen by the embedding application.
//!
//! # Durability
//!
//! A failed snapshot write does not discard the delta: the caller receives
//! it together with [`SnapshotState::Stale`] and must assume the next diff
//! may surface the same entities again.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backend::StorageBackend;
use crate::error::StoreError;

/// Key under which the batch path stores a bucket's collection snapshot.
pub const SNAPSHOT_KEY: &str = "snapshot";

/// Prefix of every per-entity key. Snapshot and entity keys never collide,
/// whatever an entity's identity is.
pub const ENTITY_KEY_PREFIX: &str = "entity:";

/// Returns the storage key the per-entity path uses for `identity`.
pub fn entity_key(identity: &str) -> String {
    format!("{ENTITY_KEY_PREFIX}{identity}")
}

/// An externally sourced record with a stable primary key.
pub trait Entity {
    /// Returns the identity key (an address, a numeric id) that stays the
    /// same across fetches of the same entity.
    fn identity(&self) -> String;
}

/// What makes an entity part of the delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePolicy {
    /// The identity is absent from the previous snapshot. Field changes on
    /// a known entity are not reported.
    #[default]
    Identity,
    /// The identity is absent, or the entity's serialized form differs
    /// from the one persisted for the same identity.
    Content,
}

/// Outcome of persisting the new snapshot.
#[derive(Debug)]
pub enum SnapshotState {
    /// The fetched collection matched the stored snapshot byte for byte;
    /// nothing was written.
    Unchanged,
    /// The new snapshot was written.
    Written,
    /// Reading or writing the snapshot failed. The store may be one
    /// generation behind the fetch.
    Stale(StoreError),
}

/// Result of a batch diff.
#[derive(Debug)]
pub struct Diff<T> {
    /// Entities to report, in fetch order, at most one per identity.
    pub delta: Vec<T>,
    /// What happened to the persisted snapshot.
    pub snapshot: SnapshotState,
}

impl<T> Diff<T> {
    /// Returns `true` when there is nothing to report.
    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }

    /// Returns `true` when the persisted snapshot may not reflect this fetch.
    pub fn is_stale(&self) -> bool {
        matches!(self.snapshot, SnapshotState::Stale(_))
    }
}

/// Diff engine between fetched collections and persisted snapshots.
#[derive(Debug)]
pub struct ChangeDetector<B: StorageBackend> {
    backend: B,
    policy: ChangePolicy,
}

impl<B: StorageBackend> ChangeDetector<B> {
    /// Creates a detector using [`ChangePolicy::Identity`].
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            policy: ChangePolicy::default(),
        }
    }

    /// Sets the change policy.
    pub fn with_policy(mut self, policy: ChangePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the active change policy.
    pub fn policy(&self) -> ChangePolicy {
        self.policy
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Diffs `fetched` against the snapshot stored for `bucket` and stores
    /// the new snapshot when anything differs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] only when `fetched` itself
    /// cannot be encoded. Storage failures are reported through
    /// [`SnapshotState::Stale`] alongside the computed delta.
    pub async fn diff<T>(&self, bucket: &str, fetched: &[T]) -> Result<Diff<T>, StoreError>
    where
        T: Entity + Serialize + DeserializeOwned + Clone,
    {
        let current = canonical_snapshot(fetched)?;

        let previous = match self.backend.get(bucket, SNAPSHOT_KEY).await {
            Ok(previous) => previous,
            Err(err) => {
                tracing::warn!(
                    bucket,
                    error = %err,
                    "snapshot read failed; reporting the whole collection and skipping the write"
                );
                return Ok(Diff {
                    delta: dedup_by_identity(fetched.iter()),
                    snapshot: SnapshotState::Stale(err),
                });
            }
        };

        if previous.as_deref() == Some(current.as_slice()) {
            tracing::debug!(bucket, entities = fetched.len(), "snapshot unchanged");
            return Ok(Diff {
                delta: Vec::new(),
                snapshot: SnapshotState::Unchanged,
            });
        }

        let known = match previous {
            Some(bytes) => decode_snapshot::<T>(bucket, &bytes),
            None => HashMap::new(),
        };
        let candidates = fetched
            .iter()
            .filter(|entity| self.is_new(*entity, &known));
        let delta = dedup_by_identity(candidates);

        let snapshot = match self.backend.set(bucket, SNAPSHOT_KEY, &current).await {
            Ok(()) => SnapshotState::Written,
            Err(err) => {
                tracing::warn!(
                    bucket,
                    error = %err,
                    "snapshot write failed; next diff may repeat this delta"
                );
                SnapshotState::Stale(err)
            }
        };

        tracing::debug!(
            bucket,
            entities = fetched.len(),
            delta = delta.len(),
            "snapshot diffed"
        );
        Ok(Diff { delta, snapshot })
    }

    /// Returns `true` if an entity with this identity was remembered in
    /// `bucket`.
    pub async fn seen(&self, bucket: &str, identity: &str) -> Result<bool, StoreError> {
        Ok(self.backend.get(bucket, &entity_key(identity)).await?.is_some())
    }

    /// Returns `true` if `entity` needs no report under the active policy:
    /// its identity was remembered and, for [`ChangePolicy::Content`], the
    /// stored representation still matches.
    pub async fn is_known<T>(&self, bucket: &str, entity: &T) -> Result<bool, StoreError>
    where
        T: Entity + Serialize,
    {
        let stored = self.backend.get(bucket, &entity_key(&entity.identity())).await?;
        match (self.policy, stored) {
            (_, None) => Ok(false),
            (ChangePolicy::Identity, Some(_)) => Ok(true),
            (ChangePolicy::Content, Some(bytes)) => Ok(bytes == serde_json::to_vec(entity)?),
        }
    }

    /// Stores `entity` under its [`entity_key`] in `bucket`.
    pub async fn remember<T>(&self, bucket: &str, entity: &T) -> Result<(), StoreError>
    where
        T: Entity + Serialize,
    {
        let bytes = serde_json::to_vec(entity)?;
        self.backend
            .set(bucket, &entity_key(&entity.identity()), &bytes)
            .await
    }

    fn is_new<T>(&self, entity: &T, known: &HashMap<String, Vec<u8>>) -> bool
    where
        T: Entity + Serialize,
    {
        match (self.policy, known.get(&entity.identity())) {
            (_, None) => true,
            (ChangePolicy::Identity, Some(_)) => false,
            (ChangePolicy::Content, Some(previous)) => serde_json::to_vec(entity)
                .map(|bytes| &bytes != previous)
                .unwrap_or(true),
        }
    }
}

/// Serializes the collection sorted by identity so that a reordered fetch
/// of the same entities produces the same bytes.
fn canonical_snapshot<T>(fetched: &[T]) -> Result<Vec<u8>, StoreError>
where
    T: Entity + Serialize,
{
    let mut ordered: Vec<&T> = fetched.iter().collect();
    ordered.sort_by_cached_key(|entity| entity.identity());
    Ok(serde_json::to_vec(&ordered)?)
}

/// Decodes a stored snapshot into identity -> serialized entity. A snapshot
/// that no longer decodes is treated as empty.
fn decode_snapshot<T>(bucket: &str, bytes: &[u8]) -> HashMap<String, Vec<u8>>
where
    T: Entity + Serialize + DeserializeOwned,
{
    match serde_json::from_slice::<Vec<T>>(bytes) {
        Ok(entities) => entities
            .iter()
            .filter_map(|entity| {
                serde_json::to_vec(entity)
                    .ok()
                    .map(|encoded| (entity.identity(), encoded))
            })
            .collect(),
        Err(err) => {
            tracing::warn!(bucket, error = %err, "stored snapshot is unreadable; treating as empty");
            HashMap::new()
        }
    }
}

fn dedup_by_identity<'a, T, I>(entities: I) -> Vec<T>
where
    T: Entity + Clone + 'a,
    I: Iterator<Item = &'a T>,
{
    let mut identities = HashSet::new();
    entities
        .filter(|entity| identities.insert(entity.identity()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Host {
        ip: String,
        name: String,
    }

    impl Entity for Host {
        fn identity(&self) -> String {
            self.ip.clone()
        }
    }

    fn host(ip: &str, name: &str) -> Host {
        Host {
            ip: ip.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn canonical_snapshot_ignores_fetch_order() {
        let a = vec![host("10.0.0.2", "b"), host("10.0.0.1", "a")];
        let b = vec![host("10.0.0.1", "a"), host("10.0.0.2", "b")];
        assert_eq!(
            canonical_snapshot(&a).unwrap(),
            canonical_snapshot(&b).unwrap()
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let hosts = [host("10.0.0.1", "a"), host("10.0.0.1", "dup")];
        let unique = dedup_by_identity(hosts.iter());
        assert_eq!(unique, vec![host("10.0.0.1", "a")]);
    }

    #[tokio::test]
    async fn reordered_fetch_rewrites_but_reports_nothing() {
        let detector = ChangeDetector::new(InMemoryBackend::new());
        let first = vec![host("10.0.0.1", "a"), host("10.0.0.2", "b")];
        detector.diff("hosts", &first).await.unwrap();

        let reordered = vec![host("10.0.0.2", "b"), host("10.0.0.1", "a")];
        let diff = detector.diff("hosts", &reordered).await.unwrap();
        assert!(diff.is_empty());
        assert!(matches!(diff.snapshot, SnapshotState::Unchanged));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_treated_as_empty() {
        let backend = InMemoryBackend::new();
        backend.set("hosts", SNAPSHOT_KEY, b"not json").await.unwrap();
        let detector = ChangeDetector::new(backend);

        let diff = detector
            .diff("hosts", &[host("10.0.0.1", "a")])
            .await
            .unwrap();
        assert_eq!(diff.delta, vec![host("10.0.0.1", "a")]);
        assert!(matches!(diff.snapshot, SnapshotState::Written));
    }

    #[tokio::test]
    async fn is_known_follows_policy() {
        let identity = ChangeDetector::new(InMemoryBackend::new());
        identity.remember("hosts", &host("10.0.0.1", "a")).await.unwrap();
        assert!(identity.is_known("hosts", &host("10.0.0.1", "renamed")).await.unwrap());

        let content = ChangeDetector::new(InMemoryBackend::new()).with_policy(ChangePolicy::Content);
        content.remember("hosts", &host("10.0.0.1", "a")).await.unwrap();
        assert!(content.is_known("hosts", &host("10.0.0.1", "a")).await.unwrap());
        assert!(!content.is_known("hosts", &host("10.0.0.1", "renamed")).await.unwrap());
    }
}
