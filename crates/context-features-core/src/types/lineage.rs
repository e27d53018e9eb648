//! Lineage records describing what data went into an assembled context.
//!
//! All records are immutable once built. Freshness is always measured in
//! whole milliseconds and clamped at zero, so clock skew between a cache
//! writer and the assembling process never produces negative ages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque feature value. Equality is JSON value equality.
pub type FeatureValue = serde_json::Value;

/// Generate a new time-ordered context identifier (UUIDv7).
///
/// The hyphenated form sorts lexicographically in creation order.
pub fn generate_context_id() -> String {
    Uuid::now_v7().to_string()
}

/// Age of a value observed at `observed` when read at `now`, in ms (>= 0).
#[inline]
pub fn freshness_ms_between(observed: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - observed).num_milliseconds().max(0) as u64
}

/// Where a resolved feature value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSource {
    Cache,
    Compute,
    Fallback,
}

impl FeatureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureSource::Cache => "cache",
            FeatureSource::Compute => "compute",
            FeatureSource::Fallback => "fallback",
        }
    }
}

/// Overall freshness of an assembled context.
///
/// Ordered by goodness: `Guaranteed` (0) < `Degraded` (1) < `Unknown` (2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessStatus {
    Guaranteed,
    Degraded,
    #[default]
    Unknown,
}

impl FreshnessStatus {
    /// Rank on the fixed goodness ordering; lower is better.
    #[inline]
    pub fn rank(&self) -> u8 {
        match self {
            FreshnessStatus::Guaranteed => 0,
            FreshnessStatus::Degraded => 1,
            FreshnessStatus::Unknown => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FreshnessStatus::Guaranteed => "guaranteed",
            FreshnessStatus::Degraded => "degraded",
            FreshnessStatus::Unknown => "unknown",
        }
    }

    /// Parse a persisted status string. Anything unrecognised is `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "guaranteed" => FreshnessStatus::Guaranteed,
            "degraded" => FreshnessStatus::Degraded,
            _ => FreshnessStatus::Unknown,
        }
    }
}

impl std::fmt::Display for FreshnessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One feature value used during context assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLineage {
    pub feature_name: String,
    pub entity_id: String,
    pub value: FeatureValue,
    /// When the value was computed or last written to the cache.
    pub timestamp: DateTime<Utc>,
    /// Age of the value at assembly time.
    pub freshness_ms: u64,
    pub source: FeatureSource,
}

impl FeatureLineage {
    /// Build a lineage entry, deriving freshness from `timestamp` and `now`.
    pub fn observed(
        feature_name: impl Into<String>,
        entity_id: impl Into<String>,
        value: FeatureValue,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
        source: FeatureSource,
    ) -> Self {
        Self {
            feature_name: feature_name.into(),
            entity_id: entity_id.into(),
            value,
            timestamp,
            freshness_ms: freshness_ms_between(timestamp, now),
            source,
        }
    }
}

/// A feature entry whose age exceeded its SLA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessViolation {
    pub feature_name: String,
    pub entity_id: String,
    pub freshness_ms: u64,
    pub sla_ms: u64,
}

/// One document chunk returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunkLineage {
    pub chunk_id: String,
    pub document_id: String,
    /// sha256 hex digest of the chunk content.
    pub content_hash: String,
    pub source_url: Option<String>,
    pub indexed_at: DateTime<Utc>,
    pub document_modified_at: Option<DateTime<Utc>>,
    pub freshness_ms: u64,
    pub is_stale: bool,
    pub similarity_score: f64,
    pub retriever_name: String,
    pub position_in_results: usize,
}

/// Inputs for [`DocumentChunkLineage::new`].
#[derive(Debug, Clone)]
pub struct ChunkObservation {
    pub chunk_id: String,
    pub document_id: String,
    pub content_hash: String,
    pub source_url: Option<String>,
    pub indexed_at: DateTime<Utc>,
    pub document_modified_at: Option<DateTime<Utc>>,
    pub similarity_score: f64,
    pub retriever_name: String,
    pub position_in_results: usize,
}

impl DocumentChunkLineage {
    /// Build chunk lineage at `now`.
    ///
    /// Freshness is measured from the source document's modification time
    /// when known, otherwise from the indexing time. `is_stale` is set iff an
    /// SLA is given and `freshness_ms > sla_ms`.
    pub fn new(observation: ChunkObservation, now: DateTime<Utc>, sla_ms: Option<u64>) -> Self {
        let reference = observation
            .document_modified_at
            .unwrap_or(observation.indexed_at);
        let freshness_ms = freshness_ms_between(reference, now);
        let is_stale = sla_ms.is_some_and(|sla| freshness_ms > sla);

        Self {
            chunk_id: observation.chunk_id,
            document_id: observation.document_id,
            content_hash: observation.content_hash,
            source_url: observation.source_url,
            indexed_at: observation.indexed_at,
            document_modified_at: observation.document_modified_at,
            freshness_ms,
            is_stale,
            similarity_score: observation.similarity_score,
            retriever_name: observation.retriever_name,
            position_in_results: observation.position_in_results,
        }
    }
}

/// One retriever invocation during context assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverLineage {
    pub retriever_name: String,
    pub query: String,
    pub results_count: usize,
    pub latency_ms: f64,
    pub index_name: Option<String>,
    pub chunks_returned: Vec<DocumentChunkLineage>,
    pub stale_chunks_count: usize,
    pub oldest_chunk_ms: u64,
}

impl RetrieverLineage {
    /// Build retriever lineage; stale count and oldest age derive from the chunks.
    pub fn new(
        retriever_name: impl Into<String>,
        query: impl Into<String>,
        latency_ms: f64,
        index_name: Option<String>,
        chunks_returned: Vec<DocumentChunkLineage>,
    ) -> Self {
        let stale_chunks_count = chunks_returned.iter().filter(|c| c.is_stale).count();
        let oldest_chunk_ms = chunks_returned
            .iter()
            .map(|c| c.freshness_ms)
            .max()
            .unwrap_or(0);
        Self {
            retriever_name: retriever_name.into(),
            query: query.into(),
            results_count: chunks_returned.len(),
            latency_ms,
            index_name,
            chunks_returned,
            stale_chunks_count,
            oldest_chunk_ms,
        }
    }
}

/// Full lineage of one context assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextLineage {
    pub context_id: String,
    pub timestamp: DateTime<Utc>,
    /// Name of the context function, for replay.
    pub context_name: Option<String>,
    /// Arguments passed to the context function, for replay.
    pub context_args: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub features_used: Vec<FeatureLineage>,
    #[serde(default)]
    pub retrievers_used: Vec<RetrieverLineage>,
    #[serde(default)]
    pub items_provided: usize,
    #[serde(default)]
    pub items_included: usize,
    #[serde(default)]
    pub items_dropped: usize,
    #[serde(default)]
    pub freshness_status: FreshnessStatus,
    #[serde(default)]
    pub stalest_feature_ms: u64,
    #[serde(default)]
    pub freshness_violations: Vec<FreshnessViolation>,
    #[serde(default)]
    pub token_usage: u64,
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub estimated_cost_usd: f64,
}

impl ContextLineage {
    /// Empty lineage for `context_id` assembled at `timestamp`.
    pub fn new(context_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            context_id: context_id.into(),
            timestamp,
            context_name: None,
            context_args: None,
            features_used: Vec::new(),
            retrievers_used: Vec::new(),
            items_provided: 0,
            items_included: 0,
            items_dropped: 0,
            freshness_status: FreshnessStatus::Unknown,
            stalest_feature_ms: 0,
            freshness_violations: Vec::new(),
            token_usage: 0,
            max_tokens: None,
            estimated_cost_usd: 0.0,
        }
    }

    /// `max(freshness_ms)` over the features used, 0 when none.
    pub fn compute_stalest_feature_ms(features: &[FeatureLineage]) -> u64 {
        features.iter().map(|f| f.freshness_ms).max().unwrap_or(0)
    }
}
