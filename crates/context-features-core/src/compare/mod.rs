//! Structural comparison of two context lineages.
//!
//! Features are keyed by `(feature_name, entity_id)`, retrievers by
//! `retriever_name`. Output diffs are emitted in key order so reports are
//! stable across runs.

pub mod sequence;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use chrono::Utc;

use crate::types::{
    ChangeType, ContentDiff, ContextDiff, ContextLineage, FeatureDiff, FeatureLineage,
    RetrieverDiff, RetrieverLineage,
};
use sequence::{split_lines_keep_ends, unified_diff, SequenceMatcher};

/// Diffs plus `(added, removed, modified)` counts. Unchanged entries are
/// included in the diffs but not counted.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison<D> {
    pub diffs: Vec<D>,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl<D> Default for Comparison<D> {
    fn default() -> Self {
        Self {
            diffs: Vec::new(),
            added: 0,
            removed: 0,
            modified: 0,
        }
    }
}

impl<D> Comparison<D> {
    fn record(&mut self, diff: D, change: ChangeType) {
        match change {
            ChangeType::Added => self.added += 1,
            ChangeType::Removed => self.removed += 1,
            ChangeType::Modified => self.modified += 1,
            ChangeType::Unchanged => {}
        }
        self.diffs.push(diff);
    }

    pub fn has_changes(&self) -> bool {
        self.added + self.removed + self.modified > 0
    }
}

pub fn compare_features(
    base: &[FeatureLineage],
    comparison: &[FeatureLineage],
) -> Comparison<FeatureDiff> {
    let key = |f: &FeatureLineage| (f.feature_name.clone(), f.entity_id.clone());
    let base_map: BTreeMap<_, &FeatureLineage> = base.iter().map(|f| (key(f), f)).collect();
    let comp_map: BTreeMap<_, &FeatureLineage> = comparison.iter().map(|f| (key(f), f)).collect();
    let keys: BTreeSet<_> = base_map.keys().chain(comp_map.keys()).cloned().collect();

    let mut out = Comparison::default();
    for k in keys {
        let old = base_map.get(&k).copied();
        let new = comp_map.get(&k).copied();
        let change = match (old, new) {
            (None, Some(_)) => ChangeType::Added,
            (Some(_), None) => ChangeType::Removed,
            (Some(o), Some(n)) if o.value != n.value => ChangeType::Modified,
            (Some(_), Some(_)) => ChangeType::Unchanged,
            (None, None) => continue,
        };
        let (feature_name, entity_id) = k;
        out.record(
            FeatureDiff {
                feature_name,
                entity_id,
                old_value: old.map(|f| f.value.clone()),
                new_value: new.map(|f| f.value.clone()),
                change_type: change,
                old_freshness_ms: old.map(|f| f.freshness_ms),
                new_freshness_ms: new.map(|f| f.freshness_ms),
            },
            change,
        );
    }
    out
}

pub fn compare_retrievers(
    base: &[RetrieverLineage],
    comparison: &[RetrieverLineage],
) -> Comparison<RetrieverDiff> {
    let base_map: BTreeMap<&str, &RetrieverLineage> = base
        .iter()
        .map(|r| (r.retriever_name.as_str(), r))
        .collect();
    let comp_map: BTreeMap<&str, &RetrieverLineage> = comparison
        .iter()
        .map(|r| (r.retriever_name.as_str(), r))
        .collect();
    let names: BTreeSet<&str> = base_map.keys().chain(comp_map.keys()).copied().collect();

    let chunk_ids = |r: &RetrieverLineage| -> Vec<String> {
        r.chunks_returned.iter().map(|c| c.chunk_id.clone()).collect()
    };

    let mut out = Comparison::default();
    for name in names {
        let diff = match (base_map.get(name), comp_map.get(name)) {
            (None, Some(&new)) => RetrieverDiff {
                retriever_name: name.to_string(),
                query_changed: true,
                old_query: None,
                new_query: Some(new.query.clone()),
                old_results_count: 0,
                new_results_count: new.results_count,
                chunks_added: chunk_ids(new),
                chunks_removed: Vec::new(),
                change_type: ChangeType::Added,
            },
            (Some(&old), None) => RetrieverDiff {
                retriever_name: name.to_string(),
                query_changed: true,
                old_query: Some(old.query.clone()),
                new_query: None,
                old_results_count: old.results_count,
                new_results_count: 0,
                chunks_added: Vec::new(),
                chunks_removed: chunk_ids(old),
                change_type: ChangeType::Removed,
            },
            (Some(&old), Some(&new)) => {
                let old_ids: BTreeSet<String> = chunk_ids(old).into_iter().collect();
                let new_ids: BTreeSet<String> = chunk_ids(new).into_iter().collect();
                let chunks_added: Vec<String> = new_ids.difference(&old_ids).cloned().collect();
                let chunks_removed: Vec<String> = old_ids.difference(&new_ids).cloned().collect();
                let query_changed = old.query != new.query;
                let change_type =
                    if query_changed || !chunks_added.is_empty() || !chunks_removed.is_empty() {
                        ChangeType::Modified
                    } else {
                        ChangeType::Unchanged
                    };
                RetrieverDiff {
                    retriever_name: name.to_string(),
                    query_changed,
                    old_query: Some(old.query.clone()),
                    new_query: Some(new.query.clone()),
                    old_results_count: old.results_count,
                    new_results_count: new.results_count,
                    chunks_added,
                    chunks_removed,
                    change_type,
                }
            }
            (None, None) => continue,
        };
        let change = diff.change_type;
        out.record(diff, change);
    }
    out
}

/// Line-level comparison of two rendered contexts.
///
/// Similarity is the character-level match ratio. Added and removed counts
/// come from a 3-line-context unified diff; `min(added, removed)` of them
/// are then reported as changed instead.
pub fn compare_content(base: &str, comparison: &str) -> ContentDiff {
    let base_chars: Vec<char> = base.chars().collect();
    let comp_chars: Vec<char> = comparison.chars().collect();
    let similarity_score = SequenceMatcher::new(&base_chars, &comp_chars).ratio();

    let base_lines = split_lines_keep_ends(base);
    let comp_lines = split_lines_keep_ends(comparison);
    let diff = unified_diff(&base_lines, &comp_lines);

    let mut added = diff
        .iter()
        .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
        .count();
    let mut removed = diff
        .iter()
        .filter(|l| l.starts_with('-') && !l.starts_with("---"))
        .count();
    let changed = added.min(removed);
    added -= changed;
    removed -= changed;

    let mut parts = Vec::new();
    if added > 0 {
        parts.push(format!("+{} lines", added));
    }
    if removed > 0 {
        parts.push(format!("-{} lines", removed));
    }
    if changed > 0 {
        parts.push(format!("~{} lines modified", changed));
    }
    let diff_summary = if parts.is_empty() {
        "No changes".to_string()
    } else {
        parts.join(", ")
    };

    ContentDiff {
        lines_added: added,
        lines_removed: removed,
        lines_changed: changed,
        similarity_score,
        diff_summary,
    }
}

/// Compare two context assemblies. Content is diffed only when both sides
/// are supplied.
pub fn compare_contexts(
    base: &ContextLineage,
    comparison: &ContextLineage,
    base_content: Option<&str>,
    comparison_content: Option<&str>,
) -> ContextDiff {
    let features = compare_features(&base.features_used, &comparison.features_used);
    let retrievers = compare_retrievers(&base.retrievers_used, &comparison.retrievers_used);
    let content_diff = match (base_content, comparison_content) {
        (Some(b), Some(c)) => Some(compare_content(b, c)),
        _ => None,
    };

    let token_delta = comparison.token_usage as i64 - base.token_usage as i64;
    let cost_delta_usd = comparison.estimated_cost_usd - base.estimated_cost_usd;
    let freshness_improved = comparison.freshness_status.rank() < base.freshness_status.rank();

    let has_changes = features.has_changes()
        || retrievers.has_changes()
        || content_diff
            .as_ref()
            .is_some_and(|c| c.similarity_score < 1.0);

    let mut parts = Vec::new();
    for (count, what) in [
        (features.added, "features added"),
        (features.removed, "features removed"),
        (features.modified, "features modified"),
        (retrievers.added, "retrievers added"),
        (retrievers.removed, "retrievers removed"),
        (retrievers.modified, "retrievers modified"),
    ] {
        if count > 0 {
            parts.push(format!("{} {}", count, what));
        }
    }
    if let Some(content) = content_diff.as_ref() {
        if content.diff_summary != "No changes" {
            parts.push(format!("content: {}", content.diff_summary));
        }
    }
    if token_delta != 0 {
        parts.push(format!("tokens: {}", signed(token_delta)));
    }
    let change_summary = if parts.is_empty() {
        "No changes detected".to_string()
    } else {
        parts.join("; ")
    };

    ContextDiff {
        base_context_id: base.context_id.clone(),
        comparison_context_id: comparison.context_id.clone(),
        timestamp: Utc::now(),
        time_delta_ms: (comparison.timestamp - base.timestamp).num_milliseconds(),
        feature_diffs: features.diffs,
        features_added: features.added,
        features_removed: features.removed,
        features_modified: features.modified,
        retriever_diffs: retrievers.diffs,
        retrievers_added: retrievers.added,
        retrievers_removed: retrievers.removed,
        retrievers_modified: retrievers.modified,
        content_diff,
        token_delta,
        cost_delta_usd,
        base_freshness_status: base.freshness_status,
        comparison_freshness_status: comparison.freshness_status,
        freshness_improved,
        has_changes,
        change_summary,
    }
}

fn signed(n: i64) -> String {
    if n > 0 {
        format!("+{}", n)
    } else {
        n.to_string()
    }
}

fn display_value(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}

/// Render a diff as a plain-text report. `verbose` lists every non-unchanged
/// feature and retriever.
pub fn format_diff_report(diff: &ContextDiff, verbose: bool) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();
    // Writing to a String cannot fail.
    let mut line = |s: String| {
        let _ = writeln!(out, "{}", s);
    };

    line(rule.clone());
    line("Context Diff Report".into());
    line(rule.clone());
    line(format!("Base context:       {}", diff.base_context_id));
    line(format!("Comparison context: {}", diff.comparison_context_id));
    line(format!("Time delta:         {}ms", diff.time_delta_ms));
    line(String::new());

    line("Summary:".into());
    line(format!("  {}", diff.change_summary));
    line(String::new());

    line("Features:".into());
    line(format!("  Added:    {}", diff.features_added));
    line(format!("  Removed:  {}", diff.features_removed));
    line(format!("  Modified: {}", diff.features_modified));
    if verbose && !diff.feature_diffs.is_empty() {
        line(String::new());
        for fd in diff
            .feature_diffs
            .iter()
            .filter(|d| d.change_type != ChangeType::Unchanged)
        {
            line(format!(
                "    [{}] {} ({})",
                fd.change_type.as_str().to_uppercase(),
                fd.feature_name,
                fd.entity_id
            ));
            match fd.change_type {
                ChangeType::Modified => {
                    line(format!("      Old: {}", display_value(&fd.old_value)));
                    line(format!("      New: {}", display_value(&fd.new_value)));
                }
                ChangeType::Added => line(format!("      Value: {}", display_value(&fd.new_value))),
                ChangeType::Removed => {
                    line(format!("      Value: {}", display_value(&fd.old_value)))
                }
                ChangeType::Unchanged => {}
            }
        }
    }
    line(String::new());

    line("Retrievers:".into());
    line(format!("  Added:    {}", diff.retrievers_added));
    line(format!("  Removed:  {}", diff.retrievers_removed));
    line(format!("  Modified: {}", diff.retrievers_modified));
    if verbose && !diff.retriever_diffs.is_empty() {
        line(String::new());
        for rd in diff
            .retriever_diffs
            .iter()
            .filter(|d| d.change_type != ChangeType::Unchanged)
        {
            line(format!(
                "    [{}] {}",
                rd.change_type.as_str().to_uppercase(),
                rd.retriever_name
            ));
            if rd.query_changed {
                line(format!(
                    "      Query changed: '{}' -> '{}'",
                    rd.old_query.as_deref().unwrap_or("None"),
                    rd.new_query.as_deref().unwrap_or("None")
                ));
            }
            if !rd.chunks_added.is_empty() {
                line(format!("      Chunks added: {}", rd.chunks_added.len()));
            }
            if !rd.chunks_removed.is_empty() {
                line(format!("      Chunks removed: {}", rd.chunks_removed.len()));
            }
        }
    }
    line(String::new());

    if let Some(content) = &diff.content_diff {
        line("Content:".into());
        line(format!("  Similarity: {:.2}%", content.similarity_score * 100.0));
        line(format!("  {}", content.diff_summary));
    }
    line(String::new());

    let cost_sign = if diff.cost_delta_usd > 0.0 { "+" } else { "" };
    line("Token/Cost Changes:".into());
    line(format!("  Tokens: {}", signed(diff.token_delta)));
    line(format!("  Cost:   {}${:.6}", cost_sign, diff.cost_delta_usd));
    line(String::new());

    line("Freshness:".into());
    line(format!("  Base:       {}", diff.base_freshness_status));
    line(format!("  Comparison: {}", diff.comparison_freshness_status));
    let improved = if diff.freshness_improved { "True" } else { "False" };
    line(format!("  Improved:   {}", improved));
    line(String::new());
    line(rule);

    // Drop the trailing newline written after the closing rule.
    out.pop();
    out
}
