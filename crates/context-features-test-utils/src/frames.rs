//! Entity frame builders.

use rand::Rng;
use serde_json::json;

use context_features_core::types::Frame;

/// Frame with `entity_id` and `event_timestamp` (epoch millis) columns.
pub fn entity_frame(rows: &[(&str, i64)]) -> Frame {
    Frame::from_rows(
        ["entity_id", "event_timestamp"],
        rows.iter()
            .map(|(id, millis)| vec![json!(id), json!(millis)])
            .collect(),
    )
    .expect("two cells per row")
}

/// `count` distinct ids of the form `user_<n>`.
pub fn random_entity_ids(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut ids = std::collections::BTreeSet::new();
    while ids.len() < count {
        ids.insert(format!("user_{}", rng.gen_range(0..1_000_000u32)));
    }
    ids.into_iter().collect()
}
