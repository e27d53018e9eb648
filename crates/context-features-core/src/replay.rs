//! Retriever snapshots and drift detection on replay.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Map;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::retrieval::{chunk_lineage, content_hash};
use crate::traits::{RetrievedChunk, Retriever};
use crate::types::{RetrieverReplayResult, RetrieverSnapshot};

/// Absolute score change above which a shared chunk counts as drifted.
pub const SCORE_DRIFT_TOLERANCE: f64 = 0.01;

/// Run `query` against `retriever` and capture the full result.
pub async fn capture_snapshot(
    retriever: &dyn Retriever,
    query: &str,
    top_k: usize,
    sla_ms: Option<u64>,
    context_id: Option<String>,
) -> CoreResult<RetrieverSnapshot> {
    let started = Instant::now();
    let chunks = retriever.retrieve(query, top_k).await?;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    let now = Utc::now();

    let mut search_params = Map::new();
    search_params.insert("top_k".into(), top_k.into());

    Ok(RetrieverSnapshot {
        snapshot_id: Uuid::now_v7().to_string(),
        retriever_name: retriever.name().to_string(),
        query: query.to_string(),
        timestamp: now,
        results: chunks
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?,
        results_count: chunks.len(),
        chunks: chunk_lineage(retriever.name(), &chunks, now, sla_ms),
        chunk_contents: chunks
            .iter()
            .map(|c| (c.chunk_id.clone(), c.content.clone()))
            .collect(),
        latency_ms,
        index_name: retriever.index_name().map(str::to_string),
        embedding_model: retriever.embedding_model().map(str::to_string),
        search_params,
        context_id,
    })
}

/// Re-run the snapshot's query and report drift against it.
///
/// `top_k` is taken from the snapshot's search params, falling back to its
/// result count.
pub async fn replay_snapshot(
    retriever: &dyn Retriever,
    snapshot: &RetrieverSnapshot,
) -> CoreResult<RetrieverReplayResult> {
    let top_k = snapshot
        .search_params
        .get("top_k")
        .and_then(|v| v.as_u64())
        .map(|k| k as usize)
        .unwrap_or(snapshot.results_count);
    let live = retriever.retrieve(&snapshot.query, top_k).await?;
    Ok(diff_snapshot(snapshot, &live, Utc::now()))
}

/// Compare a snapshot with a live result set.
///
/// Chunks on both sides are modified when their content hash differs, and
/// contribute `live - snapshot` to the score drift. Max and average drift are
/// taken over absolute values.
pub fn diff_snapshot(
    snapshot: &RetrieverSnapshot,
    live: &[RetrievedChunk],
    replayed_at: DateTime<Utc>,
) -> RetrieverReplayResult {
    let old: BTreeMap<&str, (&str, f64)> = snapshot
        .chunks
        .iter()
        .map(|c| {
            (
                c.chunk_id.as_str(),
                (c.content_hash.as_str(), c.similarity_score),
            )
        })
        .collect();
    let new: BTreeMap<&str, (String, f64)> = live
        .iter()
        .map(|c| (c.chunk_id.as_str(), (content_hash(&c.content), c.score)))
        .collect();

    let old_ids: BTreeSet<&str> = old.keys().copied().collect();
    let new_ids: BTreeSet<&str> = new.keys().copied().collect();
    let chunks_added: Vec<String> = new_ids.difference(&old_ids).map(|s| s.to_string()).collect();
    let chunks_removed: Vec<String> = old_ids.difference(&new_ids).map(|s| s.to_string()).collect();

    let mut chunks_modified = Vec::new();
    let mut score_drift = BTreeMap::new();
    for id in old_ids.intersection(&new_ids) {
        let (old_hash, old_score) = old[id];
        let (new_hash, new_score) = &new[id];
        if old_hash != new_hash.as_str() {
            chunks_modified.push(id.to_string());
        }
        score_drift.insert(id.to_string(), new_score - old_score);
    }

    let max_score_drift = score_drift.values().map(|d| d.abs()).fold(0.0, f64::max);
    let avg_score_drift = if score_drift.is_empty() {
        0.0
    } else {
        score_drift.values().map(|d| d.abs()).sum::<f64>() / score_drift.len() as f64
    };

    let mut parts = Vec::new();
    if !chunks_added.is_empty() {
        parts.push(format!("+{} chunks", chunks_added.len()));
    }
    if !chunks_removed.is_empty() {
        parts.push(format!("-{} chunks", chunks_removed.len()));
    }
    if !chunks_modified.is_empty() {
        parts.push(format!("~{} chunks modified", chunks_modified.len()));
    }
    if max_score_drift > SCORE_DRIFT_TOLERANCE {
        parts.push(format!("max score drift {:.4}", max_score_drift));
    }
    let has_drift = !parts.is_empty();
    let drift_summary = if has_drift {
        parts.join(", ")
    } else {
        "No drift".to_string()
    };

    RetrieverReplayResult {
        snapshot_id: snapshot.snapshot_id.clone(),
        replayed_at,
        live_results_count: live.len(),
        snapshot_results_count: snapshot.results_count,
        chunks_added,
        chunks_removed,
        chunks_modified,
        score_drift,
        max_score_drift,
        avg_score_drift,
        has_drift,
        drift_summary,
    }
}
