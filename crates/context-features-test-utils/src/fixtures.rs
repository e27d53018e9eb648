//! Lineage and record builders.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map};

use context_features_core::types::{
    ContextLineage, ContextRecord, FeatureLineage, FeatureSource, FeatureValue, FreshnessStatus,
};

/// UTC timestamp from epoch millis.
pub fn ts(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .expect("valid epoch millis")
}

/// Feature lineage observed `freshness_ms` before `now`.
pub fn feature_lineage(
    name: &str,
    value: FeatureValue,
    freshness_ms: u64,
    source: FeatureSource,
) -> FeatureLineage {
    let now = Utc::now();
    FeatureLineage {
        feature_name: name.to_string(),
        entity_id: "user_1".to_string(),
        value,
        timestamp: now - chrono::Duration::milliseconds(freshness_ms as i64),
        freshness_ms,
        source,
    }
}

/// Lineage holding `features`, with stalest age and status filled in.
pub fn lineage_with_features(
    context_id: &str,
    timestamp: DateTime<Utc>,
    features: Vec<FeatureLineage>,
    status: FreshnessStatus,
) -> ContextLineage {
    let mut lineage = ContextLineage::new(context_id, timestamp);
    lineage.context_name = Some("support".to_string());
    lineage.stalest_feature_ms = ContextLineage::compute_stalest_feature_ms(&features);
    lineage.features_used = features;
    lineage.freshness_status = status;
    lineage
}

/// A logged context named `name` with lineage and the usual meta keys.
pub fn context_record(
    context_id: &str,
    timestamp: DateTime<Utc>,
    name: &str,
    content: &str,
) -> ContextRecord {
    let token_usage = content.split_whitespace().count() as u64;
    let mut lineage = lineage_with_features(
        context_id,
        timestamp,
        vec![feature_lineage("tier", json!("pro"), 1_000, FeatureSource::Cache)],
        FreshnessStatus::Guaranteed,
    );
    lineage.context_name = Some(name.to_string());
    lineage.token_usage = token_usage;

    let mut meta = Map::new();
    meta.insert("name".into(), json!(name));
    meta.insert("token_usage".into(), json!(token_usage));
    meta.insert("freshness_status".into(), json!("guaranteed"));

    ContextRecord::new(context_id, timestamp, content)
        .with_lineage(lineage)
        .with_meta(meta)
}
