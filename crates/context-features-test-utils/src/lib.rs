//! Shared fixtures for context-features tests.
//!
//! Builders here produce fully populated lineage, records and frames so
//! integration tests exercise the same shapes production code writes.

pub mod fixtures;
pub mod frames;
pub mod retrievers;

pub use fixtures::{context_record, feature_lineage, lineage_with_features, ts};
pub use frames::{entity_frame, random_entity_ids};
pub use retrievers::{chunk, StaticRetriever};
