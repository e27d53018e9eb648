//! In-memory context log for tests and local development.
//!
//! # TEST ONLY
//!
//! Records live in a DashMap and vanish with the process. Use the RocksDB
//! store from `context-features-storage` for anything persistent.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::CoreResult;
use crate::traits::{ContextLogStore, SnapshotStore};
use crate::types::{ContextQuery, ContextRecord, ContextSummary, RetrieverSnapshot};

#[derive(Debug, Default)]
pub struct InMemoryContextLogStore {
    records: DashMap<String, ContextRecord>,
    snapshots: DashMap<String, RetrieverSnapshot>,
}

impl InMemoryContextLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ContextLogStore for InMemoryContextLogStore {
    async fn log(&self, record: ContextRecord) -> CoreResult<()> {
        debug!("Logging context {}", record.context_id);
        self.records.insert(record.context_id.clone(), record);
        Ok(())
    }

    async fn get(&self, context_id: &str) -> Option<ContextRecord> {
        self.records.get(context_id).map(|r| r.clone())
    }

    async fn list(&self, query: ContextQuery) -> Vec<ContextSummary> {
        let mut matching: Vec<_> = self
            .records
            .iter()
            .map(|r| r.meta_projection())
            .filter(|p| query.contains_time(p.timestamp) && p.matches(&query))
            .collect();
        matching.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.context_id.cmp(&a.context_id))
        });
        matching
            .iter()
            .take(query.limit)
            .map(|p| p.to_summary())
            .collect()
    }
}

#[async_trait]
impl SnapshotStore for InMemoryContextLogStore {
    async fn save_snapshot(&self, snapshot: RetrieverSnapshot) -> CoreResult<()> {
        self.snapshots
            .insert(snapshot.snapshot_id.clone(), snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> Option<RetrieverSnapshot> {
        self.snapshots.get(snapshot_id).map(|s| s.clone())
    }
}
