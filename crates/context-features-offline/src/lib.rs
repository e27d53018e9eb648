//! Point-in-time (AS-OF) joins over historical feature relations.
//!
//! [`SqliteOfflineStore`] implements the core `OfflineStore` trait on an
//! embedded SQLite database. SQLite has no native AS-OF join, so each
//! feature column is a correlated "latest row at or before" subquery built
//! by [`query_builder`], the only place identifiers are interpolated.

pub mod convert;
pub mod error;
pub mod query_builder;
pub mod sqlite_store;

pub use error::OfflineError;
pub use sqlite_store::SqliteOfflineStore;
