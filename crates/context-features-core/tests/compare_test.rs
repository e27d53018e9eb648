//! Diff properties over lineage built from shared fixtures.

use serde_json::json;

use context_features_core::compare::compare_features;
use context_features_core::types::{ChangeType, FeatureSource};
use context_features_core::{compare_contexts, format_diff_report, FreshnessStatus};
use context_features_test_utils::{feature_lineage, lineage_with_features, ts};

#[test]
fn test_added_feature_is_the_only_counted_change() {
    let base = vec![feature_lineage("a", json!(1), 0, FeatureSource::Compute)];
    let comparison = vec![
        feature_lineage("a", json!(1), 0, FeatureSource::Compute),
        feature_lineage("b", json!(2), 0, FeatureSource::Compute),
    ];

    let result = compare_features(&base, &comparison);
    assert_eq!(result.added, 1);
    assert_eq!(result.removed, 0);
    assert_eq!(result.modified, 0);
    assert_eq!(result.diffs.len(), 2);

    let added: Vec<_> = result
        .diffs
        .iter()
        .filter(|d| d.change_type == ChangeType::Added)
        .collect();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].feature_name, "b");
    assert_eq!(
        result
            .diffs
            .iter()
            .filter(|d| d.change_type == ChangeType::Unchanged)
            .count(),
        1
    );
}

#[test]
fn test_identical_contexts_have_no_changes() {
    let features = vec![
        feature_lineage("tier", json!("gold"), 500, FeatureSource::Cache),
        feature_lineage("score", json!(0.7), 0, FeatureSource::Compute),
    ];
    let base = lineage_with_features("a", ts(1_000), features.clone(), FreshnessStatus::Guaranteed);
    let comparison = lineage_with_features("a", ts(1_000), features, FreshnessStatus::Guaranteed);

    let diff = compare_contexts(&base, &comparison, Some("same text"), Some("same text"));
    assert!(!diff.has_changes);
    assert_eq!(diff.change_summary, "No changes detected");
    assert!(!diff.freshness_improved);
    assert_eq!(diff.content_diff.as_ref().unwrap().similarity_score, 1.0);
}

#[test]
fn test_freshness_improved_only_when_rank_gets_better() {
    let degraded = lineage_with_features("a", ts(0), vec![], FreshnessStatus::Degraded);
    let guaranteed = lineage_with_features("b", ts(10), vec![], FreshnessStatus::Guaranteed);

    assert!(compare_contexts(&degraded, &guaranteed, None, None).freshness_improved);
    assert!(!compare_contexts(&guaranteed, &guaranteed, None, None).freshness_improved);
    assert!(!compare_contexts(&guaranteed, &degraded, None, None).freshness_improved);

    let report = format_diff_report(&compare_contexts(&degraded, &guaranteed, None, None), false);
    assert!(report.contains("  Improved:   True"));
}

#[test]
fn test_summary_lists_parts_in_fixed_order() {
    let base = lineage_with_features(
        "a",
        ts(0),
        vec![feature_lineage("tier", json!("free"), 0, FeatureSource::Compute)],
        FreshnessStatus::Guaranteed,
    );
    let mut comparison = lineage_with_features(
        "b",
        ts(0),
        vec![feature_lineage("tier", json!("pro"), 0, FeatureSource::Compute)],
        FreshnessStatus::Guaranteed,
    );
    comparison.token_usage = 12;

    let diff = compare_contexts(&base, &comparison, Some("x\n"), Some("y\n"));
    assert!(diff.has_changes);
    let features_at = diff.change_summary.find("feature").unwrap();
    let tokens_at = diff.change_summary.find("tokens").unwrap();
    assert!(features_at < tokens_at);

    let report = format_diff_report(&diff, true);
    assert!(report.contains("tier"));
    assert!(!report.ends_with('\n'));
}
