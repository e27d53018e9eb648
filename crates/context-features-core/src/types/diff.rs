//! Diff outputs produced by the compare engine.
//!
//! These are pure computation results. They are never persisted and are
//! always recomputed from two lineages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lineage::{FeatureValue, FreshnessStatus};

/// Classification of one keyed item across two contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
    Unchanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::Modified => "modified",
            ChangeType::Unchanged => "unchanged",
        }
    }

    /// Report marker: `+`, `-`, `~` or blank.
    pub fn symbol(&self) -> &'static str {
        match self {
            ChangeType::Added => "+",
            ChangeType::Removed => "-",
            ChangeType::Modified => "~",
            ChangeType::Unchanged => " ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDiff {
    pub feature_name: String,
    pub entity_id: String,
    pub old_value: Option<FeatureValue>,
    pub new_value: Option<FeatureValue>,
    pub change_type: ChangeType,
    pub old_freshness_ms: Option<u64>,
    pub new_freshness_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverDiff {
    pub retriever_name: String,
    pub query_changed: bool,
    pub old_query: Option<String>,
    pub new_query: Option<String>,
    pub old_results_count: usize,
    pub new_results_count: usize,
    pub chunks_added: Vec<String>,
    pub chunks_removed: Vec<String>,
    pub change_type: ChangeType,
}

/// Line-level comparison of two rendered contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDiff {
    pub lines_added: usize,
    pub lines_removed: usize,
    /// Approximated as `min(added, removed)`; moved lines are not detected.
    pub lines_changed: usize,
    /// Character-level similarity in `[0.0, 1.0]`.
    pub similarity_score: f64,
    pub diff_summary: String,
}

/// Complete comparison of two contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDiff {
    pub base_context_id: String,
    pub comparison_context_id: String,
    /// When the diff was computed.
    pub timestamp: DateTime<Utc>,
    /// comparison.timestamp - base.timestamp, may be negative.
    pub time_delta_ms: i64,

    pub feature_diffs: Vec<FeatureDiff>,
    pub features_added: usize,
    pub features_removed: usize,
    pub features_modified: usize,

    pub retriever_diffs: Vec<RetrieverDiff>,
    pub retrievers_added: usize,
    pub retrievers_removed: usize,
    pub retrievers_modified: usize,

    pub content_diff: Option<ContentDiff>,

    pub token_delta: i64,
    pub cost_delta_usd: f64,

    pub base_freshness_status: FreshnessStatus,
    pub comparison_freshness_status: FreshnessStatus,
    pub freshness_improved: bool,

    pub has_changes: bool,
    pub change_summary: String,
}
