//! Content-free projection of a logged context, for explain endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lineage::{FeatureSource, FreshnessStatus};
use super::record::ContextRecord;

/// Lightweight trace of one context assembly. Holds ids, counts and status
/// only; never the rendered text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTrace {
    pub context_id: String,
    pub created_at: DateTime<Utc>,
    pub latency_ms: f64,
    pub token_usage: u64,
    pub cost_usd: Option<f64>,
    pub freshness_status: FreshnessStatus,
    /// Features that breached their SLA and chunks flagged stale.
    pub stale_sources: Vec<String>,
    /// Feature names and chunk ids that contributed to the context.
    pub source_ids: Vec<String>,
    pub cache_hit: bool,
    pub missing_features: Vec<String>,
    pub meta: Map<String, Value>,
}

impl ContextTrace {
    /// Project a stored record.
    ///
    /// `latency_ms` and `missing_features` come from `meta`. Counts, status and
    /// sources come from the lineage when present, falling back to `meta`.
    pub fn from_record(record: &ContextRecord) -> Self {
        let meta = &record.meta;
        let latency_ms = meta.get("latency_ms").and_then(Value::as_f64).unwrap_or(0.0);
        let missing_features = meta
            .get("missing_features")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        match &record.lineage {
            Some(lineage) => {
                let mut stale_sources: Vec<String> = lineage
                    .freshness_violations
                    .iter()
                    .map(|v| v.feature_name.clone())
                    .collect();
                let mut source_ids: Vec<String> = lineage
                    .features_used
                    .iter()
                    .map(|f| f.feature_name.clone())
                    .collect();
                for retriever in &lineage.retrievers_used {
                    for chunk in &retriever.chunks_returned {
                        source_ids.push(chunk.chunk_id.clone());
                        if chunk.is_stale {
                            stale_sources.push(chunk.chunk_id.clone());
                        }
                    }
                }

                Self {
                    context_id: record.context_id.clone(),
                    created_at: record.timestamp,
                    latency_ms,
                    token_usage: lineage.token_usage,
                    cost_usd: Some(lineage.estimated_cost_usd),
                    freshness_status: lineage.freshness_status,
                    stale_sources,
                    source_ids,
                    cache_hit: !lineage.features_used.is_empty()
                        && lineage
                            .features_used
                            .iter()
                            .all(|f| f.source == FeatureSource::Cache),
                    missing_features,
                    meta: meta.clone(),
                }
            }
            None => Self {
                context_id: record.context_id.clone(),
                created_at: record.timestamp,
                latency_ms,
                token_usage: meta.get("token_usage").and_then(Value::as_u64).unwrap_or(0),
                cost_usd: meta.get("cost_usd").and_then(Value::as_f64),
                freshness_status: FreshnessStatus::parse(
                    meta.get("freshness_status")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown"),
                ),
                stale_sources: Vec::new(),
                source_ids: Vec::new(),
                cache_hit: meta.get("cache_hit").and_then(Value::as_bool).unwrap_or(false),
                missing_features,
                meta: meta.clone(),
            },
        }
    }
}
