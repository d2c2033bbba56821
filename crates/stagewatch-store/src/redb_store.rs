//! ReDB storage backend.
//!
//! Single-file embedded store for the daemon. All buckets share one table
//! keyed by `{bucket}:{key}`; a bucket listing is a range scan starting at
//! the bucket prefix. redb holds an exclusive lock on the file, which is
//! what enforces "one active instance per storage path".

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::backend::{make_key, make_prefix, parse_key, validate_bucket, StorageBackend};
use crate::error::StoreError;

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("stagewatch_records_v1");

/// ReDB storage backend.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend").finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Opens or creates the database file at `path` and makes sure the
    /// records table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| {
            StoreError::backend(format!("failed to open database {}", path.display()), e)
        })?;

        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::backend("failed to begin transaction", e))?;
        write_txn
            .open_table(RECORDS)
            .map_err(|e| StoreError::backend("failed to create records table", e))?;
        write_txn
            .commit()
            .map_err(|e| StoreError::backend("failed to commit", e))?;

        tracing::debug!(path = %path.display(), "opened redb store");
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_bucket(bucket)?;
        let composite = make_key(bucket, key);

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend("failed to begin read", e))?;
        let table = read_txn
            .open_table(RECORDS)
            .map_err(|e| StoreError::backend("failed to open table", e))?;

        let value = table
            .get(composite.as_str())
            .map_err(|e| StoreError::backend(format!("get {composite} failed"), e))?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    async fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_bucket(bucket)?;
        let composite = make_key(bucket, key);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend("failed to begin write", e))?;
        {
            let mut table = write_txn
                .open_table(RECORDS)
                .map_err(|e| StoreError::backend("failed to open table", e))?;
            table
                .insert(composite.as_str(), value)
                .map_err(|e| StoreError::backend(format!("insert {composite} failed"), e))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend("commit failed", e))?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        validate_bucket(bucket)?;
        let composite = make_key(bucket, key);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend("failed to begin write", e))?;
        let existed = {
            let mut table = write_txn
                .open_table(RECORDS)
                .map_err(|e| StoreError::backend("failed to open table", e))?;
            let removed = table
                .remove(composite.as_str())
                .map_err(|e| StoreError::backend(format!("remove {composite} failed"), e))?;
            removed.is_some()
        };
        write_txn
            .commit()
            .map_err(|e| StoreError::backend("commit failed", e))?;
        Ok(existed)
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        validate_bucket(bucket)?;
        let prefix = make_prefix(bucket);

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend("failed to begin read", e))?;
        let table = read_txn
            .open_table(RECORDS)
            .map_err(|e| StoreError::backend("failed to open table", e))?;

        let mut keys = Vec::new();
        let range = table
            .range(prefix.as_str()..)
            .map_err(|e| StoreError::backend("range scan failed", e))?;
        for entry in range {
            let (key, _) = entry.map_err(|e| StoreError::backend("range scan failed", e))?;
            match parse_key(key.value()) {
                Some((owner, rest)) if owner == bucket => keys.push(rest.to_string()),
                _ => break,
            }
        }
        Ok(keys)
    }
}
