//! Persistent context lineage storage.
//!
//! Provides [`RocksDbContextStore`], a RocksDB implementation of the
//! `ContextLogStore` and `SnapshotStore` traits from
//! `context-features-core`.
//!
//! # Column Families
//! See [`column_families`] for definitions.

pub mod column_families;
pub mod config;
pub mod context_store;
pub mod error;
pub mod keys;

pub use config::{RocksDbConfig, DEFAULT_CACHE_SIZE, DEFAULT_MAX_OPEN_FILES};
pub use context_store::RocksDbContextStore;
pub use error::{StorageError, StorageResult};
