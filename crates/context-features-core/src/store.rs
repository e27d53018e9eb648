//! The `FeatureStore` facade.
//!
//! Everything an outer surface (HTTP handlers, CLI, jobs) needs goes
//! through this type: online lookups, training joins, retrieval with
//! lineage, context logging, explain and diff, cache invalidation and
//! materialization. Stores, features and retrievers are wired explicitly
//! through [`FeatureStoreBuilder`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, info, info_span, warn, Span};

use crate::assembly::{AssembledContext, ContextAssembler};
use crate::compare::compare_contexts;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::online::{InMemoryOnlineStore, OnlineResolver, ResolvedFeatures};
use crate::registry::FeatureRegistry;
use crate::replay;
use crate::retrieval::record_retrieval;
use crate::stubs::InMemoryContextLogStore;
use crate::traits::{
    ContextLogStore, OfflineStore, OnlineStore, RetrievedChunk, Retriever, SnapshotStore,
};
use crate::types::{
    ContextDiff, ContextLineage, ContextQuery, ContextRecord, ContextSummary, ContextTrace,
    FeatureValue, Frame, RetrieverLineage, RetrieverReplayResult, RetrieverSnapshot,
};

/// Outcome of materializing one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    pub feature_name: String,
    /// Rows written to the online store.
    pub rows_online: usize,
    /// Rows appended to the offline relation; 0 without an offline store.
    pub rows_offline: usize,
    /// Entity ids whose compute failed with no default.
    pub failed: Vec<String>,
}

pub struct FeatureStoreBuilder {
    registry: FeatureRegistry,
    config: Config,
    online: Option<Arc<dyn OnlineStore>>,
    offline: Option<Arc<dyn OfflineStore>>,
    context_log: Option<Arc<dyn ContextLogStore>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    retrievers: Vec<Arc<dyn Retriever>>,
    span: Option<Span>,
}

impl FeatureStoreBuilder {
    pub fn new(registry: FeatureRegistry) -> Self {
        Self {
            registry,
            config: Config::default(),
            online: None,
            offline: None,
            context_log: None,
            snapshots: None,
            retrievers: Vec::new(),
            span: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_online_store(mut self, store: Arc<dyn OnlineStore>) -> Self {
        self.online = Some(store);
        self
    }

    pub fn with_offline_store(mut self, store: Arc<dyn OfflineStore>) -> Self {
        self.offline = Some(store);
        self
    }

    pub fn with_context_log(mut self, store: Arc<dyn ContextLogStore>) -> Self {
        self.context_log = Some(store);
        self
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retrievers.push(retriever);
        self
    }

    /// Parent span for all store events. Defaults to `feature_store`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Validate the configuration and wire the store.
    ///
    /// Missing online, context-log and snapshot backends default to the
    /// in-memory implementations.
    pub fn build(self) -> CoreResult<FeatureStore> {
        self.config.validate()?;

        let mut retrievers = HashMap::new();
        for retriever in self.retrievers {
            let name = retriever.name().to_string();
            if retrievers.insert(name.clone(), retriever).is_some() {
                return Err(CoreError::validation(
                    "retriever",
                    format!("retriever '{}' is registered twice", name),
                ));
            }
        }

        let span = self.span.unwrap_or_else(|| info_span!("feature_store"));
        let online = self
            .online
            .unwrap_or_else(|| Arc::new(InMemoryOnlineStore::new()));

        let (context_log, snapshots) = match (self.context_log, self.snapshots) {
            (Some(log), Some(snaps)) => (log, snaps),
            (log, snaps) => {
                let memory = Arc::new(InMemoryContextLogStore::new());
                (
                    log.unwrap_or_else(|| memory.clone()),
                    snaps.unwrap_or_else(|| memory.clone()),
                )
            }
        };

        let registry = Arc::new(self.registry);
        let resolver = OnlineResolver::with_span(
            Arc::clone(&online),
            Arc::clone(&registry),
            &self.config.online,
            info_span!(parent: &span, "online_resolver"),
        );

        info!(
            parent: &span,
            "Feature store ready: {} features, {} retrievers, offline={}",
            registry.len(),
            retrievers.len(),
            self.offline.is_some()
        );

        Ok(FeatureStore {
            registry,
            online,
            offline: self.offline,
            context_log,
            snapshots,
            retrievers,
            resolver,
            config: self.config,
            span,
        })
    }
}

pub struct FeatureStore {
    registry: Arc<FeatureRegistry>,
    online: Arc<dyn OnlineStore>,
    offline: Option<Arc<dyn OfflineStore>>,
    context_log: Arc<dyn ContextLogStore>,
    snapshots: Arc<dyn SnapshotStore>,
    retrievers: HashMap<String, Arc<dyn Retriever>>,
    resolver: OnlineResolver,
    config: Config,
    span: Span,
}

impl FeatureStore {
    pub fn builder(registry: FeatureRegistry) -> FeatureStoreBuilder {
        FeatureStoreBuilder::new(registry)
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn online_store(&self) -> &Arc<dyn OnlineStore> {
        &self.online
    }

    pub fn offline_store(&self) -> Option<&Arc<dyn OfflineStore>> {
        self.offline.as_ref()
    }

    /// Resolve features for one entity. Partial failures land in `errors`.
    pub async fn get_online_features(
        &self,
        entity_name: &str,
        entity_id: &str,
        feature_names: &[String],
    ) -> ResolvedFeatures {
        self.resolver
            .resolve(entity_name, entity_id, feature_names)
            .await
    }

    /// Drop cached values for one entity. Best effort: failures are logged
    /// and reported as zero removals.
    pub async fn invalidate_cache(&self, entity_name: &str, entity_id: &str) -> usize {
        match self.online.delete(entity_name, entity_id).await {
            Ok(removed) => {
                debug!(
                    parent: &self.span,
                    "Invalidated {} cached features for {}:{}", removed, entity_name, entity_id
                );
                removed
            }
            Err(e) => {
                warn!(
                    parent: &self.span,
                    "Cache invalidation failed for {}:{}: {}", entity_name, entity_id, e
                );
                0
            }
        }
    }

    /// Point-in-time training join. Without an offline store the frame is
    /// returned unchanged.
    pub async fn get_training_data(
        &self,
        entity_frame: Frame,
        feature_names: &[String],
        entity_id_column: &str,
        timestamp_column: &str,
    ) -> CoreResult<Frame> {
        match &self.offline {
            Some(offline) => {
                offline
                    .get_training_data(
                        entity_frame,
                        feature_names,
                        entity_id_column,
                        timestamp_column,
                    )
                    .await
            }
            None => {
                warn!(parent: &self.span, "No offline store configured; returning entity frame unchanged");
                Ok(entity_frame)
            }
        }
    }

    pub async fn get_historical_features(
        &self,
        entity_name: &str,
        entity_id: &str,
        feature_names: &[String],
        timestamp: DateTime<Utc>,
    ) -> HashMap<String, FeatureValue> {
        match &self.offline {
            Some(offline) => {
                offline
                    .get_historical_features(entity_name, entity_id, feature_names, timestamp)
                    .await
            }
            None => {
                warn!(parent: &self.span, "No offline store configured; returning no historical features");
                HashMap::new()
            }
        }
    }

    fn retriever(&self, name: &str) -> CoreResult<&Arc<dyn Retriever>> {
        self.retrievers.get(name).ok_or_else(|| CoreError::NotFound {
            kind: "Retriever",
            name: name.to_string(),
        })
    }

    /// Run a registered retriever and capture its lineage. `top_k` defaults
    /// to `retrieval.default_top_k`.
    pub async fn retrieve(
        &self,
        retriever_name: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> CoreResult<(RetrieverLineage, Vec<RetrievedChunk>)> {
        let retriever = self.retriever(retriever_name)?;
        record_retrieval(
            retriever.as_ref(),
            query,
            top_k.unwrap_or(self.config.retrieval.default_top_k),
            self.config.retrieval.chunk_freshness_sla_ms,
        )
        .await
    }

    /// Capture and persist a snapshot of a retriever call.
    pub async fn capture_snapshot(
        &self,
        retriever_name: &str,
        query: &str,
        top_k: Option<usize>,
        context_id: Option<String>,
    ) -> CoreResult<RetrieverSnapshot> {
        let retriever = self.retriever(retriever_name)?;
        let snapshot = replay::capture_snapshot(
            retriever.as_ref(),
            query,
            top_k.unwrap_or(self.config.retrieval.default_top_k),
            self.config.retrieval.chunk_freshness_sla_ms,
            context_id,
        )
        .await?;
        self.snapshots.save_snapshot(snapshot.clone()).await?;
        Ok(snapshot)
    }

    /// Replay a stored snapshot against its live retriever.
    pub async fn replay_snapshot(&self, snapshot_id: &str) -> CoreResult<RetrieverReplayResult> {
        let snapshot = self
            .snapshots
            .get_snapshot(snapshot_id)
            .await
            .ok_or_else(|| CoreError::NotFound {
                kind: "Snapshot",
                name: snapshot_id.to_string(),
            })?;
        let retriever = self.retriever(&snapshot.retriever_name)?;
        replay::replay_snapshot(retriever.as_ref(), &snapshot).await
    }

    /// Assembler preloaded with this store's pricing and chunk SLA.
    pub fn assembler(&self, name: impl Into<String>) -> ContextAssembler {
        ContextAssembler::new(name)
            .with_pricing(self.config.pricing.clone())
            .with_chunk_sla(self.config.retrieval.chunk_freshness_sla_ms)
    }

    /// Persist an assembled context. Returns its id.
    pub async fn log_context(&self, context: AssembledContext) -> CoreResult<String> {
        let id = context.context_id.clone();
        self.log_record(context.into_record()).await?;
        Ok(id)
    }

    pub async fn log_record(&self, record: ContextRecord) -> CoreResult<()> {
        let id = record.context_id.clone();
        self.context_log.log(record).await.map_err(|e| {
            error!(parent: &self.span, "Failed to log context {}: {}", id, e);
            e
        })
    }

    pub async fn get_context(&self, context_id: &str) -> Option<ContextRecord> {
        self.context_log.get(context_id).await
    }

    pub async fn list_contexts(&self, query: ContextQuery) -> Vec<ContextSummary> {
        self.context_log.list(query).await
    }

    /// Content-free trace of a logged context.
    pub async fn explain_context(&self, context_id: &str) -> Option<ContextTrace> {
        let record = self.context_log.get(context_id).await?;
        Some(ContextTrace::from_record(&record))
    }

    /// Load two logged contexts and compare them, content included.
    ///
    /// Records logged without lineage compare as empty lineages.
    pub async fn diff_contexts(&self, base_id: &str, comparison_id: &str) -> CoreResult<ContextDiff> {
        let base = self
            .context_log
            .get(base_id)
            .await
            .ok_or_else(|| CoreError::context_not_found(base_id))?;
        let comparison = self
            .context_log
            .get(comparison_id)
            .await
            .ok_or_else(|| CoreError::context_not_found(comparison_id))?;

        let lineage_of = |r: &ContextRecord| {
            r.lineage
                .clone()
                .unwrap_or_else(|| ContextLineage::new(r.context_id.clone(), r.timestamp))
        };
        Ok(compare_contexts(
            &lineage_of(&base),
            &lineage_of(&comparison),
            Some(base.content.as_str()),
            Some(comparison.content.as_str()),
        ))
    }

    /// Compute `feature_name` for every id and write the values online and,
    /// when configured, to the offline relation.
    ///
    /// Failed computes fall back to the feature default; ids with neither
    /// are reported in `failed` and skipped.
    pub async fn materialize(
        &self,
        feature_name: &str,
        entity_ids: &[String],
    ) -> CoreResult<MaterializeReport> {
        let spec = self
            .registry
            .feature(feature_name)
            .ok_or_else(|| CoreError::feature_not_found(feature_name))?;
        let entity = self
            .registry
            .entity(&spec.entity)
            .ok_or_else(|| CoreError::Internal(format!("entity '{}' vanished", spec.entity)))?;

        let mut online_frame = Frame::new([entity.id_column.as_str(), feature_name]);
        let mut offline_frame = Frame::new(["entity_id", "timestamp", feature_name]);
        let mut failed = Vec::new();
        let now = Utc::now().to_rfc3339();

        for entity_id in entity_ids {
            let value = match spec.compute.compute(entity_id).await {
                Ok(value) => value,
                Err(e) => match &spec.default {
                    Some(default) => {
                        warn!(
                            parent: &self.span,
                            "Materialize: compute failed for {} ({}), using default: {}",
                            feature_name, entity_id, e
                        );
                        default.clone()
                    }
                    None => {
                        warn!(
                            parent: &self.span,
                            "Materialize: compute failed for {} ({}): {}", feature_name, entity_id, e
                        );
                        failed.push(entity_id.clone());
                        continue;
                    }
                },
            };
            online_frame.push_row(vec![json!(entity_id), value.clone()])?;
            offline_frame.push_row(vec![json!(entity_id), Value::String(now.clone()), value])?;
        }

        self.online
            .set_bulk(&spec.entity, &online_frame, feature_name, &entity.id_column)
            .await?;
        let rows_offline = match &self.offline {
            Some(offline) => offline.write_feature_frame(feature_name, &offline_frame).await?,
            None => 0,
        };

        info!(
            parent: &self.span,
            "Materialized {}: {} online, {} offline, {} failed",
            feature_name,
            online_frame.len(),
            rows_offline,
            failed.len()
        );
        Ok(MaterializeReport {
            feature_name: feature_name.to_string(),
            rows_online: online_frame.len(),
            rows_offline,
            failed,
        })
    }

    /// Materialize every feature flagged `materialize`, using the ids listed
    /// for its entity. Features whose entity has no ids are skipped.
    pub async fn materialize_all(
        &self,
        entity_ids: &HashMap<String, Vec<String>>,
    ) -> CoreResult<Vec<MaterializeReport>> {
        let mut reports = Vec::new();
        for spec in self.registry.features().filter(|f| f.materialize) {
            let Some(ids) = entity_ids.get(&spec.entity) else {
                debug!(parent: &self.span, "No entity ids for {}, skipping {}", spec.entity, spec.name);
                continue;
            };
            reports.push(self.materialize(&spec.name, ids).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::ContextItem;
    use crate::registry::{EntitySpec, FeatureSpec};
    use crate::traits::{compute_fn, ComputeError};
    use crate::types::FeatureSource;

    fn store() -> FeatureStore {
        let mut registry = FeatureRegistry::new();
        registry
            .add_entity(EntitySpec::new("user", "user_id"))
            .unwrap();
        registry
            .add_feature(
                FeatureSpec::new("score", "user", compute_fn(|id| Ok(json!(id.len()))))
                    .materialized(),
            )
            .unwrap();
        registry
            .add_feature(
                FeatureSpec::new(
                    "risky",
                    "user",
                    compute_fn(|id| {
                        if id == "bad" {
                            Err(ComputeError::new("nope"))
                        } else {
                            Ok(json!(true))
                        }
                    }),
                )
                .materialized(),
            )
            .unwrap();
        FeatureStore::builder(registry).build().unwrap()
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_materialize_then_read_from_cache() {
        let store = store();
        let report = store
            .materialize("score", &names(&["u1", "user22"]))
            .await
            .unwrap();
        assert_eq!(report.rows_online, 2);
        assert_eq!(report.rows_offline, 0);

        let resolved = store
            .get_online_features("user", "user22", &names(&["score"]))
            .await;
        assert_eq!(resolved.values["score"], json!(6));
        assert_eq!(resolved.lineage[0].source, FeatureSource::Cache);

        assert_eq!(store.invalidate_cache("user", "user22").await, 1);
        let resolved = store
            .get_online_features("user", "user22", &names(&["score"]))
            .await;
        assert_eq!(resolved.lineage[0].source, FeatureSource::Compute);
    }

    #[tokio::test]
    async fn test_materialize_all_reports_failures() {
        let store = store();
        let ids = HashMap::from([("user".to_string(), names(&["ok", "bad"]))]);
        let reports = store.materialize_all(&ids).await.unwrap();
        assert_eq!(reports.len(), 2);
        let risky = reports.iter().find(|r| r.feature_name == "risky").unwrap();
        assert_eq!(risky.rows_online, 1);
        assert_eq!(risky.failed, names(&["bad"]));
    }

    #[tokio::test]
    async fn test_log_explain_and_diff() {
        let store = store();
        let first = store
            .get_online_features("user", "u1", &names(&["score"]))
            .await;
        let a = store
            .assembler("support")
            .with_features(&first)
            .with_item(ContextItem::new("hello world", 0))
            .assemble()
            .unwrap();
        let b = store
            .assembler("support")
            .with_features(&first)
            .with_item(ContextItem::new("hello there world", 0))
            .assemble()
            .unwrap();
        let a_id = store.log_context(a).await.unwrap();
        let b_id = store.log_context(b).await.unwrap();

        let trace = store.explain_context(&a_id).await.unwrap();
        assert_eq!(trace.context_id, a_id);
        assert_eq!(trace.token_usage, 2);
        assert!(store.explain_context("missing").await.is_none());

        let diff = store.diff_contexts(&a_id, &b_id).await.unwrap();
        assert!(diff.has_changes);
        assert_eq!(diff.features_modified, 0);
        assert_eq!(diff.token_delta, 1);

        let err = store.diff_contexts(&a_id, "missing").await.unwrap_err();
        assert!(err.is_not_found());

        let listed = store.list_contexts(ContextQuery::default()).await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].context_id, b_id);
    }

    #[tokio::test]
    async fn test_unknown_retriever_is_not_found() {
        let store = store();
        let err = store.retrieve("nope", "q", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = Config::default();
        config.online.max_concurrent_lookups = 0;
        let result = FeatureStore::builder(FeatureRegistry::new())
            .with_config(config)
            .build();
        assert!(result.is_err());
    }
}
