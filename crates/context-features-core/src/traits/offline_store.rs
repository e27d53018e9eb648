//! Offline (training) store abstraction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::types::{FeatureValue, Frame};

/// Point-in-time feature retrieval over historical relations.
///
/// Each feature `f` is backed by a relation `f(entity_id, timestamp, f)`.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// AS-OF left join of `entity_frame` against every feature relation.
    ///
    /// Appends one column per feature holding the latest value at or before
    /// the row's timestamp, or null. An invalid feature name fails the whole
    /// call; a failed query returns `entity_frame` unchanged.
    async fn get_training_data(
        &self,
        entity_frame: Frame,
        feature_names: &[String],
        entity_id_column: &str,
        timestamp_column: &str,
    ) -> CoreResult<Frame>;

    /// Single-entity AS-OF lookup. Invalid names are skipped; any failure
    /// yields an empty map.
    async fn get_historical_features(
        &self,
        entity_name: &str,
        entity_id: &str,
        feature_names: &[String],
        timestamp: DateTime<Utc>,
    ) -> HashMap<String, FeatureValue>;

    /// Run a raw statement and return its result set.
    async fn execute_sql(&self, sql: &str) -> CoreResult<Frame>;

    /// Append rows to the relation backing `feature_name`, creating it if
    /// needed. `frame` carries `entity_id`, `timestamp` and `feature_name`
    /// columns. Returns the number of rows written.
    async fn write_feature_frame(&self, feature_name: &str, frame: &Frame) -> CoreResult<usize>;
}
