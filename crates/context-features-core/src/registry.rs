//! Explicit entity and feature registration.
//!
//! Callers build a [`FeatureRegistry`] up front and hand it to the store
//! builder. Nothing is discovered at runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::identifier::is_valid_identifier;
use crate::traits::FeatureCompute;
use crate::types::FeatureValue;

/// A keyed thing features are computed for (user, document, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    pub name: String,
    /// Column carrying the entity id in frames.
    pub id_column: String,
    pub description: Option<String>,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_column: id_column.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One registered feature.
#[derive(Clone)]
pub struct FeatureSpec {
    pub name: String,
    /// Name of the owning entity.
    pub entity: String,
    pub compute: Arc<dyn FeatureCompute>,
    /// Substituted when compute fails.
    pub default: Option<FeatureValue>,
    /// Maximum acceptable age in ms. Overrides the global default.
    pub freshness_sla: Option<u64>,
    /// Included in `materialize_all`.
    pub materialize: bool,
}

impl FeatureSpec {
    pub fn new(
        name: impl Into<String>,
        entity: impl Into<String>,
        compute: Arc<dyn FeatureCompute>,
    ) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            compute,
            default: None,
            freshness_sla: None,
            materialize: false,
        }
    }

    pub fn with_default(mut self, default: FeatureValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_freshness_sla(mut self, sla_ms: u64) -> Self {
        self.freshness_sla = Some(sla_ms);
        self
    }

    pub fn materialized(mut self) -> Self {
        self.materialize = true;
        self
    }
}

impl fmt::Debug for FeatureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureSpec")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("default", &self.default)
            .field("freshness_sla", &self.freshness_sla)
            .field("materialize", &self.materialize)
            .finish_non_exhaustive()
    }
}

/// Returned by [`FeatureRegistry::add_entity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    name: String,
}

impl EntityHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Returned by [`FeatureRegistry::add_feature`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureHandle {
    name: String,
    entity: String,
}

impl FeatureHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    entities: BTreeMap<String, EntitySpec>,
    features: BTreeMap<String, FeatureSpec>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity. Names must be unique.
    pub fn add_entity(&mut self, spec: EntitySpec) -> CoreResult<EntityHandle> {
        if spec.name.trim().is_empty() {
            return Err(CoreError::validation("entity", "entity name must not be empty"));
        }
        if self.entities.contains_key(&spec.name) {
            return Err(CoreError::validation(
                "entity",
                format!("entity '{}' is already registered", spec.name),
            ));
        }
        let handle = EntityHandle {
            name: spec.name.clone(),
        };
        self.entities.insert(spec.name.clone(), spec);
        Ok(handle)
    }

    /// Register a feature against an already registered entity.
    ///
    /// The name must satisfy [`is_valid_identifier`], since materialization
    /// stores it as an offline relation name.
    pub fn add_feature(&mut self, spec: FeatureSpec) -> CoreResult<FeatureHandle> {
        if !is_valid_identifier(&spec.name) {
            return Err(CoreError::validation(
                "feature",
                format!(
                    "feature name '{}' must match [a-zA-Z_][a-zA-Z0-9_]*",
                    spec.name
                ),
            ));
        }
        if !self.entities.contains_key(&spec.entity) {
            return Err(CoreError::validation(
                "feature",
                format!(
                    "feature '{}' references unknown entity '{}'",
                    spec.name, spec.entity
                ),
            ));
        }
        if self.features.contains_key(&spec.name) {
            return Err(CoreError::validation(
                "feature",
                format!("feature '{}' is already registered", spec.name),
            ));
        }
        let handle = FeatureHandle {
            name: spec.name.clone(),
            entity: spec.entity.clone(),
        };
        self.features.insert(spec.name.clone(), spec);
        Ok(handle)
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySpec> {
        self.entities.get(name)
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.get(name)
    }

    /// Features in name order.
    pub fn features(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.features.values()
    }

    pub fn features_for_entity<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = &'a FeatureSpec> + 'a {
        self.features.values().filter(move |f| f.entity == entity)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::compute_fn;
    use serde_json::json;

    fn registry() -> (FeatureRegistry, EntityHandle) {
        let mut registry = FeatureRegistry::new();
        let user = registry
            .add_entity(EntitySpec::new("user", "user_id"))
            .unwrap();
        (registry, user)
    }

    #[test]
    fn test_add_feature_returns_handle() {
        let (mut registry, user) = registry();
        let handle = registry
            .add_feature(
                FeatureSpec::new("user_tier", user.name(), compute_fn(|_| Ok(json!("free"))))
                    .with_default(json!("free"))
                    .with_freshness_sla(5_000)
                    .materialized(),
            )
            .unwrap();

        assert_eq!(handle.name(), "user_tier");
        assert_eq!(handle.entity(), "user");
        let spec = registry.feature("user_tier").unwrap();
        assert_eq!(spec.freshness_sla, Some(5_000));
        assert!(spec.materialize);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rejects_unknown_entity() {
        let (mut registry, _) = registry();
        let err = registry
            .add_feature(FeatureSpec::new("x", "document", compute_fn(|_| Ok(json!(1)))))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("document"));
    }

    #[test]
    fn test_rejects_duplicates() {
        let (mut registry, user) = registry();
        assert!(registry
            .add_entity(EntitySpec::new("user", "id"))
            .is_err());
        registry
            .add_feature(FeatureSpec::new("a", user.name(), compute_fn(|_| Ok(json!(1)))))
            .unwrap();
        assert!(registry
            .add_feature(FeatureSpec::new("a", user.name(), compute_fn(|_| Ok(json!(2)))))
            .is_err());
    }

    #[test]
    fn test_rejects_names_unusable_as_relations() {
        let (mut registry, user) = registry();
        for bad in ["", "user-tier", "1st_order", "tier; DROP TABLE x"] {
            let err = registry
                .add_feature(FeatureSpec::new(bad, user.name(), compute_fn(|_| Ok(json!(1)))))
                .unwrap_err();
            assert!(err.is_validation(), "{:?}", bad);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_features_for_entity() {
        let (mut registry, user) = registry();
        registry
            .add_entity(EntitySpec::new("document", "doc_id"))
            .unwrap();
        registry
            .add_feature(FeatureSpec::new("a", user.name(), compute_fn(|_| Ok(json!(1)))))
            .unwrap();
        registry
            .add_feature(FeatureSpec::new("b", "document", compute_fn(|_| Ok(json!(1)))))
            .unwrap();
        let names: Vec<&str> = registry
            .features_for_entity("user")
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["a"]);
    }
}
