//! Low-level key-value storage backend trait and key helpers.
//!
//! The [`StorageBackend`] trait is the whole contract the change detector
//! consumes: [`get`](StorageBackend::get) and [`set`](StorageBackend::set),
//! plus [`delete`](StorageBackend::delete) and
//! [`list_keys`](StorageBackend::list_keys) for maintenance.
//!
//! Backends are dumb KV stores. Snapshot canonicalization, identity
//! comparison and the "no write when unchanged" rule live in
//! [`ChangeDetector`](crate::ChangeDetector), not here.
//!
//! # Key Structure
//!
//! Engines that keep a single flat keyspace store records under composite
//! keys `{bucket}:{key}`. Bucket names are therefore forbidden from
//! containing a colon; entity keys may contain anything, since
//! [`parse_key`] splits on the first colon only.
//!
//! # Atomicity
//!
//! Each call is atomic for its single key. Nothing in the workspace needs
//! multi-key transactions and backends are not asked to provide them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;

/// Durable key-value storage namespaced by bucket.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; handlers share one backend
/// through `Arc<dyn StorageBackend>`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns the value stored under `(bucket, key)`, or `None` when the
    /// key has never been written.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidBucket`] if `bucket` is not a valid namespace.
    /// - [`StoreError::Backend`] on I/O or engine failures.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `(bucket, key)`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidBucket`] if `bucket` is not a valid namespace.
    /// - [`StoreError::Backend`] on I/O or engine failures.
    async fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Removes `(bucket, key)`. Returns `true` if the key existed.
    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    /// Lists every key stored in `bucket`, without the bucket prefix.
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(bucket, key).await
    }

    async fn set(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).set(bucket, key, value).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        (**self).delete(bucket, key).await
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_keys(bucket).await
    }
}

/// Checks that `bucket` can be used as a namespace.
///
/// # Examples
///
/// ```
/// use stagewatch_store::backend::validate_bucket;
///
/// assert!(validate_bucket("hetzner").is_ok());
/// assert!(validate_bucket("").is_err());
/// assert!(validate_bucket("a:b").is_err());
/// ```
pub fn validate_bucket(bucket: &str) -> Result<(), StoreError> {
    if bucket.is_empty() {
        return Err(StoreError::InvalidBucket {
            bucket: bucket.to_string(),
            reason: "must not be empty",
        });
    }
    if bucket.contains(':') {
        return Err(StoreError::InvalidBucket {
            bucket: bucket.to_string(),
            reason: "must not contain ':'",
        });
    }
    Ok(())
}

/// Constructs a composite storage key from bucket and entity key.
///
/// # Examples
///
/// ```
/// use stagewatch_store::backend::make_key;
///
/// assert_eq!(make_key("hetzner", "10.0.0.1"), "hetzner:10.0.0.1");
/// assert_eq!(make_key("hetzner", ""), "hetzner:");
/// ```
pub fn make_key(bucket: &str, key: &str) -> String {
    format!("{bucket}:{key}")
}

/// Splits a composite key into `(bucket, key)` on the first colon.
///
/// # Examples
///
/// ```
/// use stagewatch_store::backend::parse_key;
///
/// assert_eq!(parse_key("hetzner:10.0.0.1"), Some(("hetzner", "10.0.0.1")));
/// assert_eq!(parse_key("hetzner:fe80::1"), Some(("hetzner", "fe80::1")));
/// assert_eq!(parse_key("no-colon"), None);
/// ```
pub fn parse_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(':')
}

/// Constructs the prefix shared by every composite key in `bucket`.
pub fn make_prefix(bucket: &str) -> String {
    format!("{bucket}:")
}
