//! Persisted context records and list projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lineage::ContextLineage;

/// Default schema version written with new records.
pub const DEFAULT_RECORD_VERSION: &str = "v1";

/// Default page size for [`ContextQuery`].
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// One assembled context as stored in the lineage log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub context_id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub lineage: Option<ContextLineage>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    pub version: String,
}

impl ContextRecord {
    pub fn new(
        context_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            timestamp,
            content: content.into(),
            lineage: None,
            meta: Map::new(),
            version: DEFAULT_RECORD_VERSION.to_string(),
        }
    }

    pub fn with_lineage(mut self, lineage: ContextLineage) -> Self {
        self.lineage = Some(lineage);
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    /// Content-free projection stored alongside the record.
    pub fn meta_projection(&self) -> ContextMetaProjection {
        ContextMetaProjection {
            context_id: self.context_id.clone(),
            timestamp: self.timestamp,
            meta: self.meta.clone(),
            version: self.version.clone(),
        }
    }
}

/// The listable part of a record: everything except content and lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMetaProjection {
    pub context_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    pub version: String,
}

impl ContextMetaProjection {
    /// Whether this projection passes the name and freshness filters of `query`.
    ///
    /// Filters are exact string matches on the `/name` and
    /// `/freshness_status` paths of `meta`.
    pub fn matches(&self, query: &ContextQuery) -> bool {
        let meta = Value::Object(self.meta.clone());
        let path_eq = |pointer: &str, expected: &Option<String>| match expected {
            None => true,
            Some(expected) => meta.pointer(pointer).and_then(Value::as_str) == Some(expected),
        };
        path_eq("/name", &query.name) && path_eq("/freshness_status", &query.freshness_status)
    }

    pub fn to_summary(&self) -> ContextSummary {
        ContextSummary {
            context_id: self.context_id.clone(),
            timestamp: self.timestamp,
            name: self
                .meta
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            token_usage: self
                .meta
                .get("token_usage")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            freshness_status: self
                .meta
                .get("freshness_status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            version: self.version.clone(),
        }
    }
}

/// Row returned by `list`; never includes content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub context_id: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub token_usage: u64,
    pub freshness_status: String,
    pub version: String,
}

/// Filters for listing contexts. Range bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
    pub name: Option<String>,
    pub freshness_status: Option<String>,
}

impl Default for ContextQuery {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            limit: DEFAULT_LIST_LIMIT,
            name: None,
            freshness_status: None,
        }
    }
}

impl ContextQuery {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_freshness(mut self, status: impl Into<String>) -> Self {
        self.freshness_status = Some(status.into());
        self
    }

    #[inline]
    pub fn contains_time(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp <= e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn meta(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_summary_defaults_when_meta_empty() {
        let record = ContextRecord::new("ctx-1", Utc::now(), "hello");
        let summary = record.meta_projection().to_summary();
        assert_eq!(summary.name, "unknown");
        assert_eq!(summary.token_usage, 0);
        assert_eq!(summary.freshness_status, "unknown");
        assert_eq!(summary.version, "v1");
    }

    #[test]
    fn test_summary_reads_meta_fields() {
        let record = ContextRecord::new("ctx-1", Utc::now(), "hello").with_meta(meta(json!({
            "name": "support_prompt",
            "token_usage": 412,
            "freshness_status": "guaranteed"
        })));
        let summary = record.meta_projection().to_summary();
        assert_eq!(summary.name, "support_prompt");
        assert_eq!(summary.token_usage, 412);
        assert_eq!(summary.freshness_status, "guaranteed");
    }

    #[test]
    fn test_projection_filters() {
        let record = ContextRecord::new("ctx-1", Utc::now(), "hello").with_meta(meta(json!({
            "name": "support_prompt",
            "freshness_status": "degraded"
        })));
        let projection = record.meta_projection();

        assert!(projection.matches(&ContextQuery::default()));
        assert!(projection.matches(&ContextQuery::default().named("support_prompt")));
        assert!(!projection.matches(&ContextQuery::default().named("other")));
        assert!(projection.matches(&ContextQuery::default().with_freshness("degraded")));
        assert!(!projection.matches(
            &ContextQuery::default()
                .named("support_prompt")
                .with_freshness("guaranteed")
        ));
    }

    #[test]
    fn test_query_time_bounds_are_inclusive() {
        let now = Utc::now();
        let query = ContextQuery::default().between(now - Duration::seconds(10), now);
        assert!(query.contains_time(now));
        assert!(query.contains_time(now - Duration::seconds(10)));
        assert!(!query.contains_time(now + Duration::milliseconds(1)));
        assert_eq!(query.limit, DEFAULT_LIST_LIMIT);
    }
}
