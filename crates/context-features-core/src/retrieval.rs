//! Retriever invocation with lineage capture.

use std::time::Instant;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::CoreResult;
use crate::traits::{RetrievedChunk, Retriever};
use crate::types::{ChunkObservation, DocumentChunkLineage, RetrieverLineage};

/// Hex sha256 of chunk content.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Build lineage for `chunks` as returned by `retriever_name`, in rank order.
pub fn chunk_lineage(
    retriever_name: &str,
    chunks: &[RetrievedChunk],
    now: DateTime<Utc>,
    sla_ms: Option<u64>,
) -> Vec<DocumentChunkLineage> {
    chunks
        .iter()
        .enumerate()
        .map(|(position, chunk)| {
            DocumentChunkLineage::new(
                ChunkObservation {
                    chunk_id: chunk.chunk_id.clone(),
                    document_id: chunk.document_id.clone(),
                    content_hash: content_hash(&chunk.content),
                    source_url: chunk.source_url.clone(),
                    indexed_at: chunk.indexed_at,
                    document_modified_at: chunk.document_modified_at,
                    similarity_score: chunk.score,
                    retriever_name: retriever_name.to_string(),
                    position_in_results: position,
                },
                now,
                sla_ms,
            )
        })
        .collect()
}

/// Call `retriever` and record what it returned.
///
/// Returns the lineage together with the raw chunks so the caller can
/// render them.
pub async fn record_retrieval(
    retriever: &dyn Retriever,
    query: &str,
    top_k: usize,
    sla_ms: Option<u64>,
) -> CoreResult<(RetrieverLineage, Vec<RetrievedChunk>)> {
    let started = Instant::now();
    let chunks = retriever.retrieve(query, top_k).await?;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    let lineage = RetrieverLineage::new(
        retriever.name(),
        query,
        latency_ms,
        retriever.index_name().map(str::to_string),
        chunk_lineage(retriever.name(), &chunks, Utc::now(), sla_ms),
    );
    debug!(
        "Retriever {} returned {} chunks ({} stale) in {:.2}ms",
        lineage.retriever_name, lineage.results_count, lineage.stale_chunks_count, latency_ms
    );
    Ok((lineage, chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::Map;

    struct FixedRetriever {
        chunks: Vec<RetrievedChunk>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        fn name(&self) -> &str {
            "docs"
        }

        fn index_name(&self) -> Option<&str> {
            Some("kb_v1")
        }

        async fn retrieve(&self, _query: &str, top_k: usize) -> CoreResult<Vec<RetrievedChunk>> {
            Ok(self.chunks.iter().take(top_k).cloned().collect())
        }
    }

    fn chunk(id: &str, age: Duration) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id.to_string(),
            document_id: format!("doc-{}", id),
            content: format!("content of {}", id),
            score: 0.9,
            source_url: None,
            indexed_at: Utc::now() - age,
            document_modified_at: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn test_record_retrieval_builds_lineage() {
        let retriever = FixedRetriever {
            chunks: vec![
                chunk("a", Duration::minutes(1)),
                chunk("b", Duration::days(2)),
                chunk("c", Duration::minutes(2)),
            ],
        };
        let (lineage, chunks) = record_retrieval(&retriever, "refunds", 2, Some(3_600_000))
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(lineage.retriever_name, "docs");
        assert_eq!(lineage.index_name.as_deref(), Some("kb_v1"));
        assert_eq!(lineage.results_count, 2);
        assert_eq!(lineage.stale_chunks_count, 1);
        assert_eq!(lineage.chunks_returned[1].position_in_results, 1);
        assert_eq!(
            lineage.chunks_returned[0].content_hash,
            content_hash("content of a")
        );
        assert!(lineage.oldest_chunk_ms >= 2 * 86_400_000);
    }
}
