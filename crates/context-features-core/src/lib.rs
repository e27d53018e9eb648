//! Context Features Core Library
//!
//! Feature resolution, point-in-time training joins and context lineage for
//! ML/LLM applications.
//!
//! # Architecture
//!
//! This crate defines:
//! - Lineage records (`FeatureLineage`, `RetrieverLineage`, `ContextLineage`, ...)
//! - Capability traits (`OnlineStore`, `OfflineStore`, `ContextLogStore`, `Retriever`, ...)
//! - The online resolution engine (cache, then compute, then default)
//! - The compare engine (`compare_contexts`, `format_diff_report`)
//! - Context assembly, retrieval capture and snapshot replay
//! - The `FeatureStore` facade and its explicit builder
//! - Error types, configuration and tracing setup
//!
//! Storage backends live in `context-features-storage` (RocksDB lineage log)
//! and `context-features-offline` (SQLite AS-OF joins).
//!
//! # Example
//!
//! ```
//! use context_features_core::registry::{EntitySpec, FeatureRegistry, FeatureSpec};
//! use context_features_core::traits::compute_fn;
//!
//! let mut registry = FeatureRegistry::new();
//! let user = registry.add_entity(EntitySpec::new("user", "user_id")).unwrap();
//! let tier = registry
//!     .add_feature(FeatureSpec::new("tier", user.name(), compute_fn(|_| Ok("free".into()))))
//!     .unwrap();
//! assert_eq!(tier.entity(), "user");
//! ```

pub mod assembly;
pub mod compare;
pub mod config;
pub mod error;
pub mod identifier;
pub mod logging;
pub mod online;
pub mod registry;
pub mod replay;
pub mod retrieval;
pub mod store;
pub mod stubs;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use assembly::{AssembledContext, ContextAssembler, ContextItem, TokenCounter};
pub use compare::{compare_contexts, format_diff_report};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use logging::init_tracing;
pub use online::{OnlineResolver, ResolvedFeatures};
pub use registry::{EntityHandle, EntitySpec, FeatureHandle, FeatureRegistry, FeatureSpec};
pub use store::{FeatureStore, FeatureStoreBuilder, MaterializeReport};
pub use types::{
    generate_context_id, ContextDiff, ContextLineage, ContextRecord, ContextTrace,
    FeatureLineage, FeatureSource, FeatureValue, Frame, FreshnessStatus,
};
