//! In-process implementations of the storage traits.

pub mod context_log;

pub use context_log::InMemoryContextLogStore;
