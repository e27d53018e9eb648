//! Feature compute capability.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::FeatureValue;

/// Failure raised by a feature function.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ComputeError(pub String);

impl ComputeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Computes one feature value for an entity id.
#[async_trait]
pub trait FeatureCompute: Send + Sync {
    async fn compute(&self, entity_id: &str) -> Result<FeatureValue, ComputeError>;
}

struct FnCompute<F>(F);

#[async_trait]
impl<F> FeatureCompute for FnCompute<F>
where
    F: Fn(&str) -> Result<FeatureValue, ComputeError> + Send + Sync,
{
    async fn compute(&self, entity_id: &str) -> Result<FeatureValue, ComputeError> {
        (self.0)(entity_id)
    }
}

/// Adapt a synchronous closure into a [`FeatureCompute`].
pub fn compute_fn<F>(f: F) -> Arc<dyn FeatureCompute>
where
    F: Fn(&str) -> Result<FeatureValue, ComputeError> + Send + Sync + 'static,
{
    Arc::new(FnCompute(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_compute_fn_adapts_closure() {
        let compute = compute_fn(|id| Ok(json!(format!("tier-{}", id))));
        assert_eq!(compute.compute("u1").await, Ok(json!("tier-u1")));

        let failing = compute_fn(|_| Err(ComputeError::new("boom")));
        assert_eq!(failing.compute("u1").await.unwrap_err().to_string(), "boom");
    }
}
