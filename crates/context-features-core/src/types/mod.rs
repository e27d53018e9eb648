//! Domain records: lineage, diffs, traces, snapshots, persisted records and
//! tabular frames.

pub mod diff;
pub mod frame;
pub mod lineage;
pub mod record;
pub mod snapshot;
pub mod trace;

pub use diff::{ChangeType, ContentDiff, ContextDiff, FeatureDiff, RetrieverDiff};
pub use frame::{cell_entity_id, cell_timestamp, Frame};
pub use lineage::{
    freshness_ms_between, generate_context_id, ChunkObservation, ContextLineage,
    DocumentChunkLineage, FeatureLineage, FeatureSource, FeatureValue, FreshnessStatus,
    FreshnessViolation, RetrieverLineage,
};
pub use record::{
    ContextMetaProjection, ContextQuery, ContextRecord, ContextSummary, DEFAULT_LIST_LIMIT,
    DEFAULT_RECORD_VERSION,
};
pub use snapshot::{RetrieverReplayResult, RetrieverSnapshot};
pub use trace::ContextTrace;
