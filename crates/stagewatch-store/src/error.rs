//! Error types for storage operations.

/// Errors raised by a [`StorageBackend`](crate::StorageBackend) or by the
/// serialization boundary in [`ChangeDetector`](crate::ChangeDetector).
///
/// # Examples
///
/// ```
/// use stagewatch_store::StoreError;
///
/// let err = StoreError::InvalidBucket {
///     bucket: "a:b".to_string(),
///     reason: "must not contain ':'",
/// };
/// assert!(err.to_string().contains("a:b"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The bucket name cannot be used as a storage namespace.
    #[error("invalid bucket name '{bucket}': {reason}")]
    InvalidBucket {
        /// The rejected bucket name.
        bucket: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An I/O or engine-specific failure (file lock, corrupt page, commit
    /// failure). The engine error is reachable through `source()`.
    #[error("backend error: {message}")]
    Backend {
        /// Human-readable description of the failing operation.
        message: String,
        /// The underlying engine error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A value could not be encoded or decoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Wraps an engine error with a description of the failing operation.
    pub fn backend<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
