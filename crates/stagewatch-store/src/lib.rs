//! Bucketed persistence and change detection for stagewatch.
//!
//! This crate holds the durable half of the daemon: a tiny key-value
//! contract that every storage engine implements, two engines, and the
//! diff engine that turns a freshly fetched entity collection into the set
//! of entities nobody has been told about yet.
//!
//! # Module Organization
//!
//! - [`backend`] - The [`StorageBackend`] contract and key helpers
//! - [`memory`] - [`InMemoryBackend`] for tests and dry runs
//! - [`redb_store`] - [`RedbBackend`], a single-file embedded store (feature `redb`)
//! - [`detector`] - [`ChangeDetector`], batch diffs and per-entity membership
//! - [`error`] - [`StoreError`]
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use stagewatch_store::{ChangeDetector, Entity, InMemoryBackend};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Server {
//!     id: u64,
//!     name: String,
//! }
//!
//! impl Entity for Server {
//!     fn identity(&self) -> String {
//!         self.id.to_string()
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let detector = ChangeDetector::new(InMemoryBackend::new());
//! let servers = vec![Server { id: 1, name: "a".into() }];
//!
//! let first = detector.diff("hetzner", &servers).await.unwrap();
//! assert_eq!(first.delta, servers);
//!
//! let second = detector.diff("hetzner", &servers).await.unwrap();
//! assert!(second.delta.is_empty());
//! # }
//! ```

pub mod backend;
pub mod detector;
pub mod error;
pub mod memory;
#[cfg(feature = "redb")]
pub mod redb_store;

pub use backend::StorageBackend;
pub use detector::{
    entity_key, ChangeDetector, ChangePolicy, Diff, Entity, SnapshotState, ENTITY_KEY_PREFIX,
    SNAPSHOT_KEY,
};
pub use error::StoreError;
pub use memory::InMemoryBackend;
#[cfg(feature = "redb")]
pub use redb_store::RedbBackend;
