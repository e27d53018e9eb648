//! Logging and reading contexts through the facade with the in-memory log.

use std::sync::Arc;

use context_features_core::stubs::InMemoryContextLogStore;
use context_features_core::traits::ContextLogStore;
use context_features_core::types::ContextQuery;
use context_features_core::{FeatureRegistry, FeatureStore, FreshnessStatus};
use context_features_test_utils::{context_record, ts};

#[tokio::test]
async fn test_log_then_get_round_trips() {
    let log = Arc::new(InMemoryContextLogStore::new());
    let store = FeatureStore::builder(FeatureRegistry::new())
        .with_context_log(log.clone())
        .build()
        .unwrap();

    let record = context_record("ctx-1", ts(1_700_000_000_000), "support", "hello world");
    store.log_record(record.clone()).await.unwrap();

    let loaded = store.get_context("ctx-1").await.unwrap();
    assert_eq!(loaded.content, record.content);
    assert_eq!(loaded.lineage, record.lineage);
    assert_eq!(loaded.meta, record.meta);
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn test_relog_overwrites_instead_of_duplicating() {
    let log = Arc::new(InMemoryContextLogStore::new());
    log.log(context_record("ctx-1", ts(1_000), "support", "first"))
        .await
        .unwrap();
    log.log(context_record("ctx-1", ts(2_000), "support", "second"))
        .await
        .unwrap();

    assert_eq!(log.len(), 1);
    assert_eq!(log.get("ctx-1").await.unwrap().content, "second");
}

#[tokio::test]
async fn test_explain_reads_trace_without_content() {
    let store = FeatureStore::builder(FeatureRegistry::new()).build().unwrap();
    store
        .log_record(context_record("ctx-1", ts(5_000), "support", "three word content"))
        .await
        .unwrap();

    let trace = store.explain_context("ctx-1").await.unwrap();
    assert_eq!(trace.token_usage, 3);
    assert_eq!(trace.freshness_status, FreshnessStatus::Guaranteed);
    assert!(trace.cache_hit);
    assert_eq!(trace.source_ids, vec!["tier".to_string()]);

    let listed = store
        .list_contexts(ContextQuery::default().named("support"))
        .await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "support");
}
