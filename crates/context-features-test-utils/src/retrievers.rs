//! A retriever whose results tests can swap out between calls.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Map;

use context_features_core::error::CoreResult;
use context_features_core::traits::{RetrievedChunk, Retriever};

pub fn chunk(id: &str, content: &str, score: f64) -> RetrievedChunk {
    RetrievedChunk {
        chunk_id: id.to_string(),
        document_id: format!("doc-{}", id),
        content: content.to_string(),
        score,
        source_url: None,
        indexed_at: Utc::now(),
        document_modified_at: None,
        metadata: Map::new(),
    }
}

/// Returns the first `top_k` of a fixed chunk list.
pub struct StaticRetriever {
    name: String,
    chunks: Mutex<Vec<RetrievedChunk>>,
}

impl StaticRetriever {
    pub fn new(name: &str, chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            name: name.to_string(),
            chunks: Mutex::new(chunks),
        }
    }

    /// Replace the results served from now on.
    pub fn set_chunks(&self, chunks: Vec<RetrievedChunk>) {
        *self.chunks.lock() = chunks;
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_name(&self) -> Option<&str> {
        Some("test_index")
    }

    async fn retrieve(&self, _query: &str, top_k: usize) -> CoreResult<Vec<RetrievedChunk>> {
        Ok(self.chunks.lock().iter().take(top_k).cloned().collect())
    }
}
