//! Online resolution through the `FeatureStore` facade.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use context_features_core::config::Config;
use context_features_core::online::InMemoryOnlineStore;
use context_features_core::traits::{compute_fn, ComputeError};
use context_features_core::types::FeatureSource;
use context_features_core::{
    EntitySpec, FeatureRegistry, FeatureSpec, FeatureStore, FreshnessStatus,
};
use context_features_test_utils::{chunk, StaticRetriever};

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn registry() -> FeatureRegistry {
    let mut registry = FeatureRegistry::new();
    let user = registry
        .add_entity(EntitySpec::new("user", "user_id"))
        .unwrap();
    registry
        .add_feature(FeatureSpec::new(
            "lifetime_value",
            user.name(),
            compute_fn(|_| Ok(json!(100))),
        ))
        .unwrap();
    registry
        .add_feature(
            FeatureSpec::new(
                "risk_score",
                user.name(),
                compute_fn(|_| Err(ComputeError::new("model offline"))),
            )
            .with_default(json!(999)),
        )
        .unwrap();
    registry
        .add_feature(FeatureSpec::new(
            "broken",
            user.name(),
            compute_fn(|_| Err(ComputeError::new("no default"))),
        ))
        .unwrap();
    registry
        .add_feature(
            FeatureSpec::new("tier", user.name(), compute_fn(|_| Ok(json!("free"))))
                .with_freshness_sla(60_000),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn test_compute_on_cache_miss() {
    let store = FeatureStore::builder(registry()).build().unwrap();
    let resolved = store
        .get_online_features("user", "u1", &names(&["lifetime_value"]))
        .await;

    assert_eq!(resolved.values.len(), 1);
    assert_eq!(resolved.values["lifetime_value"], json!(100));
    assert_eq!(resolved.lineage.len(), 1);
    assert_eq!(resolved.lineage[0].source, FeatureSource::Compute);
    assert!(resolved.is_complete());
}

#[tokio::test]
async fn test_fallback_to_default_when_compute_fails() {
    let store = FeatureStore::builder(registry()).build().unwrap();
    let resolved = store
        .get_online_features("user", "u1", &names(&["risk_score"]))
        .await;

    assert_eq!(resolved.values["risk_score"], json!(999));
    assert_eq!(resolved.lineage.len(), 1);
    assert_eq!(resolved.lineage[0].source, FeatureSource::Fallback);
    assert!(resolved.used_fallback());
}

#[tokio::test]
async fn test_partial_failure_keeps_other_features() {
    let store = FeatureStore::builder(registry()).build().unwrap();
    let resolved = store
        .get_online_features(
            "user",
            "u1",
            &names(&["lifetime_value", "broken", "no_such_feature"]),
        )
        .await;

    assert_eq!(resolved.values.len(), 1);
    assert!(resolved.errors["no_such_feature"].is_not_found());
    assert!(resolved.errors.contains_key("broken"));
    assert_eq!(
        resolved.missing_features(),
        names(&["broken", "no_such_feature"])
    );
}

#[tokio::test]
async fn test_stale_cache_entry_degrades_assembled_context() {
    let online = Arc::new(InMemoryOnlineStore::new());
    online.set_at(
        "user",
        "u1",
        "tier",
        json!("gold"),
        Utc::now() - Duration::minutes(10),
    );
    let store = FeatureStore::builder(registry())
        .with_online_store(online)
        .build()
        .unwrap();

    let resolved = store
        .get_online_features("user", "u1", &names(&["tier"]))
        .await;
    assert_eq!(resolved.values["tier"], json!("gold"));
    assert_eq!(resolved.lineage[0].source, FeatureSource::Cache);
    assert_eq!(resolved.freshness_violations.len(), 1);
    assert_eq!(resolved.freshness_violations[0].sla_ms, 60_000);

    let context = store
        .assembler("support")
        .with_features(&resolved)
        .assemble()
        .unwrap();
    assert_eq!(context.lineage.freshness_status, FreshnessStatus::Degraded);
    assert!(context.lineage.stalest_feature_ms >= 600_000);
}

#[tokio::test]
async fn test_retrieve_then_assemble_records_retriever_lineage() {
    let retriever = Arc::new(StaticRetriever::new(
        "docs",
        vec![chunk("c1", "refund policy", 0.9), chunk("c2", "shipping", 0.7)],
    ));
    let store = FeatureStore::builder(registry())
        .with_retriever(retriever)
        .build()
        .unwrap();

    let (lineage, chunks) = store.retrieve("docs", "refunds", Some(1)).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(lineage.results_count, 1);
    assert_eq!(lineage.index_name.as_deref(), Some("test_index"));

    let context = store
        .assembler("support")
        .with_retriever(lineage)
        .assemble()
        .unwrap();
    assert_eq!(context.lineage.retrievers_used.len(), 1);
}

#[tokio::test]
async fn test_snapshot_replay_detects_changed_results() {
    let retriever = Arc::new(StaticRetriever::new(
        "docs",
        vec![chunk("c1", "refund policy", 0.9)],
    ));
    let store = FeatureStore::builder(registry())
        .with_retriever(retriever.clone())
        .build()
        .unwrap();

    let snapshot = store
        .capture_snapshot("docs", "refunds", None, None)
        .await
        .unwrap();
    let unchanged = store.replay_snapshot(&snapshot.snapshot_id).await.unwrap();
    assert!(!unchanged.has_drift);

    retriever.set_chunks(vec![chunk("c2", "new policy", 0.95)]);
    let drifted = store.replay_snapshot(&snapshot.snapshot_id).await.unwrap();
    assert!(drifted.has_drift);
    assert_eq!(drifted.chunks_added, names(&["c2"]));
    assert_eq!(drifted.chunks_removed, names(&["c1"]));
}

#[test]
fn test_duplicate_retriever_is_rejected() {
    let result = FeatureStore::builder(registry())
        .with_retriever(Arc::new(StaticRetriever::new("docs", vec![])))
        .with_retriever(Arc::new(StaticRetriever::new("docs", vec![])))
        .build();
    assert!(matches!(result, Err(e) if e.is_validation()));
}

#[tokio::test]
async fn test_global_sla_applies_to_features_without_their_own() {
    let online = Arc::new(InMemoryOnlineStore::new());
    online.set_at(
        "user",
        "u1",
        "lifetime_value",
        json!(5),
        Utc::now() - Duration::hours(2),
    );
    let mut config = Config::default();
    config.online.default_freshness_sla_ms = Some(3_600_000);
    let store = FeatureStore::builder(registry())
        .with_config(config)
        .with_online_store(online)
        .build()
        .unwrap();

    let resolved = store
        .get_online_features("user", "u1", &names(&["lifetime_value"]))
        .await;
    assert_eq!(resolved.freshness_violations.len(), 1);
    assert_eq!(resolved.freshness_violations[0].sla_ms, 3_600_000);
}
