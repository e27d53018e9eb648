//! Document retriever abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreResult;

/// One result returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub score: f64,
    pub source_url: Option<String>,
    pub indexed_at: DateTime<Utc>,
    pub document_modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Stable name used to key lineage and diffs.
    fn name(&self) -> &str;

    fn index_name(&self) -> Option<&str> {
        None
    }

    fn embedding_model(&self) -> Option<&str> {
        None
    }

    /// Results in rank order, best first.
    async fn retrieve(&self, query: &str, top_k: usize) -> CoreResult<Vec<RetrievedChunk>>;
}
