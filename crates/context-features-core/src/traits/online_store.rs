//! Online (low-latency) feature cache abstraction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::types::{FeatureValue, Frame};

/// A cached value together with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFeature {
    pub value: FeatureValue,
    pub updated_at: DateTime<Utc>,
}

/// Key-value cache of feature values, keyed by (entity, id, feature).
///
/// The core depends only on this capability surface. Implementations decide
/// expiry and eviction.
#[async_trait]
pub trait OnlineStore: Send + Sync {
    /// Fetch cached values. Features with no entry are absent from the map.
    async fn get(
        &self,
        entity_name: &str,
        entity_id: &str,
        feature_names: &[String],
    ) -> CoreResult<HashMap<String, CachedFeature>>;

    /// Write values for one entity, stamped with the current time.
    async fn set(
        &self,
        entity_name: &str,
        entity_id: &str,
        values: HashMap<String, FeatureValue>,
    ) -> CoreResult<()>;

    /// Write one feature for every row of `frame`.
    ///
    /// `frame` must carry `id_column` and a column named `feature_name`.
    async fn set_bulk(
        &self,
        entity_name: &str,
        frame: &Frame,
        feature_name: &str,
        id_column: &str,
    ) -> CoreResult<()>;

    /// Drop every cached feature for one entity. Returns the number removed.
    async fn delete(&self, entity_name: &str, entity_id: &str) -> CoreResult<usize>;
}
