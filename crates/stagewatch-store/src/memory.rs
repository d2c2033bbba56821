//! In-memory storage backend.
//!
//! [`InMemoryBackend`] keeps every record in a `DashMap` keyed by the
//! composite `{bucket}:{key}` string. Nothing survives the process, which
//! makes it the backend of choice for tests and `--memory-store` dry runs.
//!
//! The backend counts successful writes so tests can assert that an
//! unchanged diff never touched the store.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::backend::{make_key, parse_key, validate_bucket, StorageBackend};
use crate::error::StoreError;

/// Thread-safe in-memory storage backend using [`DashMap`].
///
/// # Examples
///
/// ```
/// use stagewatch_store::InMemoryBackend;
///
/// let backend = InMemoryBackend::new();
/// assert!(backend.is_empty());
/// assert_eq!(backend.write_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: DashMap<String, Vec<u8>>,
    writes: AtomicU64,
}

impl InMemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records stored across all buckets.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of successful `set` calls since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_bucket(bucket)?;
        Ok(self
            .data
            .get(&make_key(bucket, key))
            .map(|entry| entry.value().clone()))
    }

    async fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_bucket(bucket)?;
        self.data.insert(make_key(bucket, key), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        validate_bucket(bucket)?;
        Ok(self.data.remove(&make_key(bucket, key)).is_some())
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        validate_bucket(bucket)?;
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter_map(|entry| match parse_key(entry.key()) {
                Some((owner, key)) if owner == bucket => Some(key.to_string()),
                _ => None,
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}
