//! Context assembly with token budgeting and lineage capture.
//!
//! The assembler gathers resolved features, retriever lineage and content
//! items, fits the items into a token budget and produces the rendered text
//! together with its [`ContextLineage`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::config::PricingConfig;
use crate::error::{CoreError, CoreResult};
use crate::online::ResolvedFeatures;
use crate::types::{
    generate_context_id, ContextLineage, ContextRecord, FeatureLineage, FeatureSource,
    FreshnessStatus, FreshnessViolation, RetrieverLineage,
};

/// Separator placed between included items.
pub const ITEM_SEPARATOR: &str = "\n\n";

/// Counts tokens in rendered text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u64;
}

/// Counts whitespace-separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> u64 {
        text.split_whitespace().count() as u64
    }
}

/// One candidate piece of context text.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextItem {
    pub content: String,
    /// Higher priorities are kept first when the budget is tight.
    pub priority: i32,
    /// Required items are never dropped.
    pub required: bool,
}

impl ContextItem {
    pub fn new(content: impl Into<String>, priority: i32) -> Self {
        Self {
            content: content.into(),
            priority,
            required: false,
        }
    }

    pub fn required(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            priority: i32::MAX,
            required: true,
        }
    }
}

/// Output of [`ContextAssembler::assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub context_id: String,
    pub content: String,
    pub lineage: ContextLineage,
    /// Listing metadata: name, token usage, freshness, latency, misses.
    pub meta: Map<String, Value>,
}

impl AssembledContext {
    pub fn into_record(self) -> ContextRecord {
        ContextRecord::new(self.context_id, self.lineage.timestamp, self.content)
            .with_lineage(self.lineage)
            .with_meta(self.meta)
    }
}

pub struct ContextAssembler {
    name: String,
    args: Option<Map<String, Value>>,
    features: Vec<FeatureLineage>,
    violations: Vec<FreshnessViolation>,
    sla_checked: usize,
    missing_features: Vec<String>,
    retrievers: Vec<RetrieverLineage>,
    chunk_sla_ms: Option<u64>,
    items: Vec<ContextItem>,
    max_tokens: Option<u64>,
    counter: Arc<dyn TokenCounter>,
    pricing: PricingConfig,
    started: Instant,
}

impl ContextAssembler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
            features: Vec::new(),
            violations: Vec::new(),
            sla_checked: 0,
            missing_features: Vec::new(),
            retrievers: Vec::new(),
            chunk_sla_ms: None,
            items: Vec::new(),
            max_tokens: None,
            counter: Arc::new(WhitespaceTokenCounter),
            pricing: PricingConfig::default(),
            started: Instant::now(),
        }
    }

    /// Arguments recorded for replay.
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_features(mut self, resolved: &ResolvedFeatures) -> Self {
        self.features.extend(resolved.lineage.iter().cloned());
        self.violations
            .extend(resolved.freshness_violations.iter().cloned());
        self.sla_checked += resolved.sla_checked;
        self.missing_features.extend(resolved.missing_features());
        self
    }

    pub fn with_retriever(mut self, lineage: RetrieverLineage) -> Self {
        self.retrievers.push(lineage);
        self
    }

    /// SLA the retriever chunks were checked against, if any.
    pub fn with_chunk_sla(mut self, sla_ms: Option<u64>) -> Self {
        self.chunk_sla_ms = sla_ms;
        self
    }

    pub fn with_item(mut self, item: ContextItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingConfig) -> Self {
        self.pricing = pricing;
        self
    }

    fn freshness_status(&self) -> FreshnessStatus {
        let stale_chunks = self.retrievers.iter().any(|r| r.stale_chunks_count > 0);
        let fallback = self
            .features
            .iter()
            .any(|f| f.source == FeatureSource::Fallback);
        if !self.violations.is_empty() || fallback || stale_chunks {
            return FreshnessStatus::Degraded;
        }
        let chunks_checked = self.chunk_sla_ms.is_some()
            && self.retrievers.iter().any(|r| !r.chunks_returned.is_empty());
        if self.sla_checked > 0 || chunks_checked {
            FreshnessStatus::Guaranteed
        } else {
            FreshnessStatus::Unknown
        }
    }

    /// Select items under the budget, keeping their original order.
    ///
    /// Items are considered by descending priority (ties by insertion order).
    /// Required items are always kept; an optional item is kept if it still
    /// fits. Fails when the required items alone exceed the budget.
    fn fit_items(&self) -> CoreResult<Vec<bool>> {
        let mut keep = vec![false; self.items.len()];
        let Some(budget) = self.max_tokens else {
            return Ok(vec![true; self.items.len()]);
        };

        let costs: Vec<u64> = self
            .items
            .iter()
            .map(|i| self.counter.count(&i.content))
            .collect();
        let mut used: u64 = 0;
        for (idx, item) in self.items.iter().enumerate() {
            if item.required {
                keep[idx] = true;
                used += costs[idx];
            }
        }
        if used > budget {
            return Err(CoreError::validation(
                "max_tokens",
                format!(
                    "required items need {} tokens but the budget is {}",
                    used, budget
                ),
            ));
        }

        let mut optional: Vec<usize> = (0..self.items.len())
            .filter(|&i| !self.items[i].required)
            .collect();
        optional.sort_by(|&a, &b| self.items[b].priority.cmp(&self.items[a].priority));
        for idx in optional {
            if used + costs[idx] <= budget {
                keep[idx] = true;
                used += costs[idx];
            }
        }
        Ok(keep)
    }

    pub fn assemble(self) -> CoreResult<AssembledContext> {
        let keep = self.fit_items()?;
        let content = self
            .items
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(item, _)| item.content.as_str())
            .collect::<Vec<_>>()
            .join(ITEM_SEPARATOR);

        let items_included = keep.iter().filter(|&&k| k).count();
        let token_usage = self.counter.count(&content);
        let freshness_status = self.freshness_status();

        let context_id = generate_context_id();
        let mut lineage = ContextLineage::new(context_id.clone(), Utc::now());
        lineage.context_name = Some(self.name.clone());
        lineage.context_args = self.args;
        lineage.stalest_feature_ms = ContextLineage::compute_stalest_feature_ms(&self.features);
        lineage.features_used = self.features;
        lineage.retrievers_used = self.retrievers;
        lineage.items_provided = self.items.len();
        lineage.items_included = items_included;
        lineage.items_dropped = self.items.len() - items_included;
        lineage.freshness_status = freshness_status;
        lineage.freshness_violations = self.violations;
        lineage.token_usage = token_usage;
        lineage.max_tokens = self.max_tokens;
        lineage.estimated_cost_usd = self.pricing.estimate_cost(token_usage);

        let latency_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut meta = Map::new();
        meta.insert("name".into(), json!(self.name));
        meta.insert("token_usage".into(), json!(token_usage));
        meta.insert("freshness_status".into(), json!(freshness_status.as_str()));
        meta.insert("latency_ms".into(), json!(latency_ms));
        meta.insert("missing_features".into(), json!(self.missing_features));

        Ok(AssembledContext {
            context_id,
            content,
            lineage,
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkObservation, DocumentChunkLineage};
    use chrono::Duration;

    fn resolved(source: FeatureSource, sla_checked: usize) -> ResolvedFeatures {
        let now = Utc::now();
        ResolvedFeatures {
            lineage: vec![FeatureLineage::observed(
                "tier",
                "u1",
                json!("gold"),
                now,
                now,
                source,
            )],
            sla_checked,
            ..Default::default()
        }
    }

    fn stale_retriever() -> RetrieverLineage {
        let now = Utc::now();
        let chunk = DocumentChunkLineage::new(
            ChunkObservation {
                chunk_id: "c1".into(),
                document_id: "d1".into(),
                content_hash: "h".into(),
                source_url: None,
                indexed_at: now - Duration::days(3),
                document_modified_at: None,
                similarity_score: 0.8,
                retriever_name: "docs".into(),
                position_in_results: 0,
            },
            now,
            Some(60_000),
        );
        RetrieverLineage::new("docs", "q", 3.0, None, vec![chunk])
    }

    #[test]
    fn test_budget_drops_low_priority_items() {
        let assembled = ContextAssembler::new("support")
            .with_item(ContextItem::required("system prompt here"))
            .with_item(ContextItem::new("low priority filler text", 1))
            .with_item(ContextItem::new("high value", 10))
            .with_max_tokens(5)
            .assemble()
            .unwrap();

        assert_eq!(assembled.content, "system prompt here\n\nhigh value");
        assert_eq!(assembled.lineage.items_provided, 3);
        assert_eq!(assembled.lineage.items_included, 2);
        assert_eq!(assembled.lineage.items_dropped, 1);
        assert_eq!(assembled.lineage.token_usage, 5);
        assert_eq!(assembled.lineage.max_tokens, Some(5));
    }

    #[test]
    fn test_required_items_over_budget_fail() {
        let err = ContextAssembler::new("support")
            .with_item(ContextItem::required("one two three"))
            .with_max_tokens(2)
            .assemble()
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_freshness_status_rules() {
        let unknown = ContextAssembler::new("c")
            .with_features(&resolved(FeatureSource::Compute, 0))
            .assemble()
            .unwrap();
        assert_eq!(unknown.lineage.freshness_status, FreshnessStatus::Unknown);

        let guaranteed = ContextAssembler::new("c")
            .with_features(&resolved(FeatureSource::Cache, 1))
            .assemble()
            .unwrap();
        assert_eq!(guaranteed.lineage.freshness_status, FreshnessStatus::Guaranteed);

        let fallback = ContextAssembler::new("c")
            .with_features(&resolved(FeatureSource::Fallback, 1))
            .assemble()
            .unwrap();
        assert_eq!(fallback.lineage.freshness_status, FreshnessStatus::Degraded);

        let stale = ContextAssembler::new("c")
            .with_retriever(stale_retriever())
            .with_chunk_sla(Some(60_000))
            .assemble()
            .unwrap();
        assert_eq!(stale.lineage.freshness_status, FreshnessStatus::Degraded);
    }

    #[test]
    fn test_meta_and_cost() {
        let assembled = ContextAssembler::new("support")
            .with_item(ContextItem::new("a b c d", 0))
            .with_pricing(PricingConfig {
                cost_per_1k_tokens: 2.0,
            })
            .assemble()
            .unwrap();
        assert!((assembled.lineage.estimated_cost_usd - 0.008).abs() < 1e-12);
        assert_eq!(assembled.meta["name"], json!("support"));
        assert_eq!(assembled.meta["token_usage"], json!(4));
        assert_eq!(assembled.meta["freshness_status"], json!("unknown"));

        let record = assembled.clone().into_record();
        assert_eq!(record.context_id, assembled.context_id);
        assert_eq!(record.lineage.as_ref(), Some(&assembled.lineage));
    }
}
