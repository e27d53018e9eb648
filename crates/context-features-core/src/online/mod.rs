//! Online feature resolution.

pub mod memory;
pub mod resolver;

pub use memory::InMemoryOnlineStore;
pub use resolver::{OnlineResolver, ResolvedFeatures};
