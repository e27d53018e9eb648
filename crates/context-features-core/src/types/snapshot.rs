//! Captured retriever state for deterministic replay and drift detection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lineage::DocumentChunkLineage;

/// Immutable capture of one retriever call, including chunk contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverSnapshot {
    pub snapshot_id: String,
    pub retriever_name: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
    /// Full result payload as returned by the retriever.
    #[serde(default)]
    pub results: Vec<Value>,
    pub results_count: usize,
    #[serde(default)]
    pub chunks: Vec<DocumentChunkLineage>,
    /// chunk_id -> content.
    #[serde(default)]
    pub chunk_contents: BTreeMap<String, String>,
    pub latency_ms: f64,
    pub index_name: Option<String>,
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub search_params: Map<String, Value>,
    /// Context this snapshot was taken for, if any.
    pub context_id: Option<String>,
}

/// Drift between a snapshot and a fresh live call of the same query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverReplayResult {
    pub snapshot_id: String,
    pub replayed_at: DateTime<Utc>,
    pub live_results_count: usize,
    pub snapshot_results_count: usize,
    pub chunks_added: Vec<String>,
    pub chunks_removed: Vec<String>,
    /// Present on both sides with different content hashes.
    pub chunks_modified: Vec<String>,
    /// chunk_id -> live score minus snapshot score, for chunks on both sides.
    pub score_drift: BTreeMap<String, f64>,
    pub max_score_drift: f64,
    pub avg_score_drift: f64,
    pub has_drift: bool,
    pub drift_summary: String,
}
