//! Context lineage log and snapshot persistence.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::types::{ContextQuery, ContextRecord, ContextSummary, RetrieverSnapshot};

/// Append-only log of assembled contexts keyed by `context_id`.
///
/// Writes surface failures. Reads degrade: a backend error on `get` looks
/// like a missing record and on `list` like an empty page.
#[async_trait]
pub trait ContextLogStore: Send + Sync {
    /// Insert or replace the record with this `context_id`.
    async fn log(&self, record: ContextRecord) -> CoreResult<()>;

    async fn get(&self, context_id: &str) -> Option<ContextRecord>;

    /// Newest-first summaries matching `query`, at most `query.limit`.
    async fn list(&self, query: ContextQuery) -> Vec<ContextSummary>;
}

/// Storage for captured retriever snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(&self, snapshot: RetrieverSnapshot) -> CoreResult<()>;

    async fn get_snapshot(&self, snapshot_id: &str) -> Option<RetrieverSnapshot>;
}
