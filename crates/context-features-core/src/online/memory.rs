//! In-memory online store backed by DashMap.
//!
//! Suitable for tests and local development. Entries never expire.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::traits::{CachedFeature, OnlineStore};
use crate::types::{cell_entity_id, FeatureValue, Frame};

type EntityKey = (String, String);

#[derive(Debug, Default)]
pub struct InMemoryOnlineStore {
    data: DashMap<EntityKey, HashMap<String, CachedFeature>>,
}

impl InMemoryOnlineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value with an explicit timestamp, e.g. to seed stale entries.
    pub fn set_at(
        &self,
        entity_name: &str,
        entity_id: &str,
        feature_name: &str,
        value: FeatureValue,
        updated_at: DateTime<Utc>,
    ) {
        self.data
            .entry((entity_name.to_string(), entity_id.to_string()))
            .or_default()
            .insert(feature_name.to_string(), CachedFeature { value, updated_at });
    }

    /// Number of cached (entity, feature) values.
    pub fn len(&self) -> usize {
        self.data.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OnlineStore for InMemoryOnlineStore {
    async fn get(
        &self,
        entity_name: &str,
        entity_id: &str,
        feature_names: &[String],
    ) -> CoreResult<HashMap<String, CachedFeature>> {
        let key = (entity_name.to_string(), entity_id.to_string());
        let Some(entry) = self.data.get(&key) else {
            return Ok(HashMap::new());
        };
        Ok(feature_names
            .iter()
            .filter_map(|name| entry.get(name).map(|c| (name.clone(), c.clone())))
            .collect())
    }

    async fn set(
        &self,
        entity_name: &str,
        entity_id: &str,
        values: HashMap<String, FeatureValue>,
    ) -> CoreResult<()> {
        let now = Utc::now();
        let mut entry = self
            .data
            .entry((entity_name.to_string(), entity_id.to_string()))
            .or_default();
        for (name, value) in values {
            entry.insert(name, CachedFeature { value, updated_at: now });
        }
        Ok(())
    }

    async fn set_bulk(
        &self,
        entity_name: &str,
        frame: &Frame,
        feature_name: &str,
        id_column: &str,
    ) -> CoreResult<()> {
        let id_idx = frame.require_column(id_column)?;
        let value_idx = frame.require_column(feature_name)?;
        let now = Utc::now();

        for row in frame.rows() {
            let entity_id = cell_entity_id(&row[id_idx]).ok_or_else(|| {
                CoreError::validation(id_column, format!("unusable entity id {}", row[id_idx]))
            })?;
            self.data
                .entry((entity_name.to_string(), entity_id))
                .or_default()
                .insert(
                    feature_name.to_string(),
                    CachedFeature {
                        value: row[value_idx].clone(),
                        updated_at: now,
                    },
                );
        }
        debug!(
            "Cached {} rows of '{}' for entity '{}'",
            frame.len(),
            feature_name,
            entity_name
        );
        Ok(())
    }

    async fn delete(&self, entity_name: &str, entity_id: &str) -> CoreResult<usize> {
        let removed = self
            .data
            .remove(&(entity_name.to_string(), entity_id.to_string()))
            .map(|(_, features)| features.len())
            .unwrap_or(0);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryOnlineStore::new();
        store
            .set("user", "u1", HashMap::from([("tier".to_string(), json!("gold"))]))
            .await
            .unwrap();

        let hits = store.get("user", "u1", &names(&["tier", "missing"])).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits["tier"].value, json!("gold"));
        assert!(store.get("user", "u2", &names(&["tier"])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_bulk_and_delete() {
        let store = InMemoryOnlineStore::new();
        let frame = Frame::from_rows(
            ["user_id", "score"],
            vec![vec![json!("u1"), json!(1)], vec![json!(2), json!(5)]],
        )
        .unwrap();
        store.set_bulk("user", &frame, "score", "user_id").await.unwrap();

        let hit = store.get("user", "2", &names(&["score"])).await.unwrap();
        assert_eq!(hit["score"].value, json!(5));
        assert_eq!(store.len(), 2);

        assert_eq!(store.delete("user", "u1").await.unwrap(), 1);
        assert_eq!(store.delete("user", "u1").await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_set_bulk_requires_columns() {
        let store = InMemoryOnlineStore::new();
        let frame = Frame::from_rows(["user_id"], vec![vec![json!("u1")]]).unwrap();
        let err = store
            .set_bulk("user", &frame, "score", "user_id")
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
