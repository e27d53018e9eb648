//! Capability traits the core depends on.
//!
//! Backends live in sibling crates (RocksDB lineage log, SQLite offline
//! engine) or in [`crate::online::memory`] and [`crate::stubs`].

pub mod compute;
pub mod context_log;
pub mod offline_store;
pub mod online_store;
pub mod retriever;

pub use compute::{compute_fn, ComputeError, FeatureCompute};
pub use context_log::{ContextLogStore, SnapshotStore};
pub use offline_store::OfflineStore;
pub use online_store::{CachedFeature, OnlineStore};
pub use retriever::{RetrievedChunk, Retriever};
