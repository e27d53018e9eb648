//! Per-feature online resolution: cache, then compute, then default.
//!
//! Every requested name yields exactly one outcome. A feature either lands
//! in `values` with one [`FeatureLineage`] entry, or in `errors`. Failures
//! never abort sibling features.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info_span, warn, Span};

use crate::config::OnlineConfig;
use crate::error::CoreError;
use crate::registry::{FeatureRegistry, FeatureSpec};
use crate::traits::{CachedFeature, OnlineStore};
use crate::types::{
    ContextLineage, FeatureLineage, FeatureSource, FeatureValue, FreshnessViolation,
};

/// Outcome of one `resolve` call.
#[derive(Debug, Default)]
pub struct ResolvedFeatures {
    pub values: HashMap<String, FeatureValue>,
    /// One entry per resolved feature, in request order.
    pub lineage: Vec<FeatureLineage>,
    pub errors: HashMap<String, CoreError>,
    pub freshness_violations: Vec<FreshnessViolation>,
    /// Number of resolved features that had an SLA to check against.
    pub sla_checked: usize,
}

impl ResolvedFeatures {
    pub fn stalest_feature_ms(&self) -> u64 {
        ContextLineage::compute_stalest_feature_ms(&self.lineage)
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Names that failed to resolve, sorted.
    pub fn missing_features(&self) -> Vec<String> {
        let mut names: Vec<String> = self.errors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn used_fallback(&self) -> bool {
        self.lineage
            .iter()
            .any(|l| l.source == FeatureSource::Fallback)
    }
}

pub struct OnlineResolver {
    store: Arc<dyn OnlineStore>,
    registry: Arc<FeatureRegistry>,
    default_sla_ms: Option<u64>,
    max_concurrent: usize,
    span: Span,
}

impl OnlineResolver {
    pub fn new(
        store: Arc<dyn OnlineStore>,
        registry: Arc<FeatureRegistry>,
        config: &OnlineConfig,
    ) -> Self {
        Self::with_span(store, registry, config, info_span!("online_resolver"))
    }

    pub fn with_span(
        store: Arc<dyn OnlineStore>,
        registry: Arc<FeatureRegistry>,
        config: &OnlineConfig,
        span: Span,
    ) -> Self {
        Self {
            store,
            registry,
            default_sla_ms: config.default_freshness_sla_ms,
            max_concurrent: config.max_concurrent_lookups.max(1),
            span,
        }
    }

    pub fn store(&self) -> &Arc<dyn OnlineStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<FeatureRegistry> {
        &self.registry
    }

    /// SLA applied to `spec`: its own threshold, else the global default.
    #[inline]
    pub fn sla_for(&self, spec: &FeatureSpec) -> Option<u64> {
        spec.freshness_sla.or(self.default_sla_ms)
    }

    /// Resolve `feature_names` for one entity.
    ///
    /// Names that are unknown or registered for a different entity land in
    /// `errors` without touching the store.
    pub async fn resolve(
        &self,
        entity_name: &str,
        entity_id: &str,
        feature_names: &[String],
    ) -> ResolvedFeatures {
        let mut result = ResolvedFeatures::default();
        let mut known: Vec<&FeatureSpec> = Vec::with_capacity(feature_names.len());

        for name in feature_names {
            match self.registry.feature(name) {
                Some(spec) if spec.entity == entity_name => known.push(spec),
                Some(spec) => {
                    warn!(
                        parent: &self.span,
                        "Feature {} belongs to entity {}, not {}", name, spec.entity, entity_name
                    );
                    result.errors.insert(
                        name.clone(),
                        CoreError::validation(
                            "entity",
                            format!(
                                "feature '{}' is registered for entity '{}', not '{}'",
                                name, spec.entity, entity_name
                            ),
                        ),
                    );
                }
                None => {
                    warn!(parent: &self.span, "Unknown feature requested: {}", name);
                    result
                        .errors
                        .insert(name.clone(), CoreError::feature_not_found(name.clone()));
                }
            }
        }
        if known.is_empty() {
            return result;
        }

        let lookup_names: Vec<String> = known.iter().map(|s| s.name.clone()).collect();
        let cached = match self.store.get(entity_name, entity_id, &lookup_names).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    parent: &self.span,
                    "Online store lookup failed for {}:{}, treating as miss: {}",
                    entity_name, entity_id, e
                );
                HashMap::new()
            }
        };

        let now = Utc::now();
        let outcomes: Vec<(&FeatureSpec, Result<FeatureLineage, CoreError>)> =
            stream::iter(known.into_iter().map(|spec| {
                let hit = cached.get(&spec.name).cloned();
                async move {
                    let outcome = self.resolve_one(spec, entity_id, hit, now).await;
                    (spec, outcome)
                }
            }))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        for (spec, outcome) in outcomes {
            match outcome {
                Ok(lineage) => {
                    if let Some(sla_ms) = self.sla_for(spec) {
                        result.sla_checked += 1;
                        if lineage.freshness_ms > sla_ms {
                            warn!(
                                parent: &self.span,
                                "Feature {} for {} is {}ms old (SLA {}ms)",
                                spec.name, entity_id, lineage.freshness_ms, sla_ms
                            );
                            result.freshness_violations.push(FreshnessViolation {
                                feature_name: spec.name.clone(),
                                entity_id: entity_id.to_string(),
                                freshness_ms: lineage.freshness_ms,
                                sla_ms,
                            });
                        }
                    }
                    result
                        .values
                        .insert(spec.name.clone(), lineage.value.clone());
                    result.lineage.push(lineage);
                }
                Err(e) => {
                    result.errors.insert(spec.name.clone(), e);
                }
            }
        }

        debug!(
            parent: &self.span,
            "Resolved {}/{} features for {}:{}",
            result.values.len(),
            feature_names.len(),
            entity_name,
            entity_id
        );
        result
    }

    async fn resolve_one(
        &self,
        spec: &FeatureSpec,
        entity_id: &str,
        hit: Option<CachedFeature>,
        now: DateTime<Utc>,
    ) -> Result<FeatureLineage, CoreError> {
        if let Some(cached) = hit.filter(|c| !c.value.is_null()) {
            return Ok(FeatureLineage::observed(
                &spec.name,
                entity_id,
                cached.value,
                cached.updated_at,
                now,
                FeatureSource::Cache,
            ));
        }

        match spec.compute.compute(entity_id).await {
            Ok(value) => Ok(FeatureLineage {
                feature_name: spec.name.clone(),
                entity_id: entity_id.to_string(),
                value,
                timestamp: now,
                freshness_ms: 0,
                source: FeatureSource::Compute,
            }),
            Err(e) => match &spec.default {
                Some(default) => {
                    warn!(
                        parent: &self.span,
                        "Compute failed for {} ({}), using default: {}",
                        spec.name, entity_id, e
                    );
                    Ok(FeatureLineage {
                        feature_name: spec.name.clone(),
                        entity_id: entity_id.to_string(),
                        value: default.clone(),
                        timestamp: now,
                        freshness_ms: 0,
                        source: FeatureSource::Fallback,
                    })
                }
                None => {
                    warn!(
                        parent: &self.span,
                        "Compute failed for {} ({}) with no default: {}",
                        spec.name, entity_id, e
                    );
                    Err(CoreError::ComputeFailed {
                        feature: spec.name.clone(),
                        message: e.to_string(),
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreResult;
    use crate::online::InMemoryOnlineStore;
    use crate::registry::EntitySpec;
    use crate::traits::{compute_fn, ComputeError};
    use crate::types::Frame;
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn registry(features: Vec<FeatureSpec>) -> Arc<FeatureRegistry> {
        let mut registry = FeatureRegistry::new();
        registry
            .add_entity(EntitySpec::new("user", "user_id"))
            .unwrap();
        for spec in features {
            registry.add_feature(spec).unwrap();
        }
        Arc::new(registry)
    }

    fn resolver(store: Arc<dyn OnlineStore>, registry: Arc<FeatureRegistry>) -> OnlineResolver {
        OnlineResolver::new(store, registry, &OnlineConfig::default())
    }

    #[tokio::test]
    async fn test_compute_on_cache_miss() {
        let reg = registry(vec![FeatureSpec::new(
            "score",
            "user",
            compute_fn(|_| Ok(json!(100))),
        )]);
        let resolver = resolver(Arc::new(InMemoryOnlineStore::new()), reg);

        let result = resolver.resolve("user", "u1", &names(&["score"])).await;
        assert_eq!(result.values, HashMap::from([("score".to_string(), json!(100))]));
        assert_eq!(result.lineage.len(), 1);
        assert_eq!(result.lineage[0].source, FeatureSource::Compute);
        assert_eq!(result.lineage[0].freshness_ms, 0);
    }

    #[tokio::test]
    async fn test_default_on_compute_failure() {
        let reg = registry(vec![FeatureSpec::new(
            "score",
            "user",
            compute_fn(|_| Err(ComputeError::new("db down"))),
        )
        .with_default(json!(999))]);
        let resolver = resolver(Arc::new(InMemoryOnlineStore::new()), reg);

        let result = resolver.resolve("user", "u1", &names(&["score"])).await;
        assert_eq!(result.values["score"], json!(999));
        assert_eq!(result.lineage[0].source, FeatureSource::Fallback);
        assert!(result.used_fallback());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_siblings() {
        let reg = registry(vec![
            FeatureSpec::new("ok", "user", compute_fn(|_| Ok(json!(1)))),
            FeatureSpec::new("broken", "user", compute_fn(|_| Err(ComputeError::new("x")))),
        ]);
        let resolver = resolver(Arc::new(InMemoryOnlineStore::new()), reg);

        let result = resolver
            .resolve("user", "u1", &names(&["ok", "broken", "nope"]))
            .await;
        assert_eq!(result.values.len(), 1);
        assert_eq!(result.lineage.len(), 1);
        assert!(matches!(
            result.errors.get("broken"),
            Some(CoreError::ComputeFailed { .. })
        ));
        assert!(result.errors["nope"].is_not_found());
        assert_eq!(result.missing_features(), names(&["broken", "nope"]));
    }

    #[tokio::test]
    async fn test_feature_of_other_entity_is_not_served() {
        let mut registry = FeatureRegistry::new();
        registry
            .add_entity(EntitySpec::new("user", "user_id"))
            .unwrap();
        registry
            .add_entity(EntitySpec::new("document", "doc_id"))
            .unwrap();
        registry
            .add_feature(FeatureSpec::new("score", "user", compute_fn(|_| Ok(json!(1)))))
            .unwrap();
        let resolver = resolver(Arc::new(InMemoryOnlineStore::new()), Arc::new(registry));

        let result = resolver.resolve("document", "d1", &names(&["score"])).await;
        assert!(result.values.is_empty());
        assert!(result.lineage.is_empty());
        assert!(result.errors["score"].is_validation());
        assert_eq!(result.missing_features(), names(&["score"]));
    }

    #[tokio::test]
    async fn test_cache_hit_reports_freshness_and_violation() {
        let store = Arc::new(InMemoryOnlineStore::new());
        store.set_at(
            "user",
            "u1",
            "tier",
            json!("gold"),
            Utc::now() - Duration::seconds(10),
        );
        let reg = registry(vec![FeatureSpec::new(
            "tier",
            "user",
            compute_fn(|_| Ok(json!("never"))),
        )
        .with_freshness_sla(1_000)]);
        let resolver = resolver(store, reg);

        let result = resolver.resolve("user", "u1", &names(&["tier"])).await;
        assert_eq!(result.values["tier"], json!("gold"));
        assert_eq!(result.lineage[0].source, FeatureSource::Cache);
        assert!(result.lineage[0].freshness_ms >= 10_000);
        assert_eq!(result.freshness_violations.len(), 1);
        assert_eq!(result.freshness_violations[0].sla_ms, 1_000);
        assert!(result.stalest_feature_ms() >= 10_000);
    }

    #[tokio::test]
    async fn test_null_cache_value_is_a_miss() {
        let store = Arc::new(InMemoryOnlineStore::new());
        store.set_at("user", "u1", "tier", json!(null), Utc::now());
        let reg = registry(vec![FeatureSpec::new(
            "tier",
            "user",
            compute_fn(|_| Ok(json!("silver"))),
        )]);
        let result = resolver(store, reg)
            .resolve("user", "u1", &names(&["tier"]))
            .await;
        assert_eq!(result.values["tier"], json!("silver"));
        assert_eq!(result.lineage[0].source, FeatureSource::Compute);
    }

    #[tokio::test]
    async fn test_global_sla_applies_without_feature_sla() {
        let store = Arc::new(InMemoryOnlineStore::new());
        store.set_at("user", "u1", "tier", json!("gold"), Utc::now() - Duration::seconds(5));
        let reg = registry(vec![FeatureSpec::new(
            "tier",
            "user",
            compute_fn(|_| Ok(json!("x"))),
        )]);
        let config = OnlineConfig {
            default_freshness_sla_ms: Some(100),
            ..Default::default()
        };
        let resolver = OnlineResolver::new(store, reg, &config);
        let result = resolver.resolve("user", "u1", &names(&["tier"])).await;
        assert_eq!(result.sla_checked, 1);
        assert_eq!(result.freshness_violations.len(), 1);
    }

    struct UnavailableStore;

    #[async_trait]
    impl OnlineStore for UnavailableStore {
        async fn get(
            &self,
            _: &str,
            _: &str,
            _: &[String],
        ) -> CoreResult<HashMap<String, CachedFeature>> {
            Err(CoreError::backend("redis", "connection refused"))
        }
        async fn set(&self, _: &str, _: &str, _: HashMap<String, FeatureValue>) -> CoreResult<()> {
            Err(CoreError::backend("redis", "connection refused"))
        }
        async fn set_bulk(&self, _: &str, _: &Frame, _: &str, _: &str) -> CoreResult<()> {
            Err(CoreError::backend("redis", "connection refused"))
        }
        async fn delete(&self, _: &str, _: &str) -> CoreResult<usize> {
            Err(CoreError::backend("redis", "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_unavailable_cache_falls_through_to_compute() {
        let reg = registry(vec![FeatureSpec::new(
            "score",
            "user",
            compute_fn(|_| Ok(json!(7))),
        )]);
        let result = resolver(Arc::new(UnavailableStore), reg)
            .resolve("user", "u1", &names(&["score"]))
            .await;
        assert_eq!(result.values["score"], json!(7));
        assert!(result.is_complete());
    }
}
