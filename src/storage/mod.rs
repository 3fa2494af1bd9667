//! Cache storage backends and storage decorators.

pub mod adapters;
pub mod memory;

pub use adapters::{FunctionsStorage, SilentErrorStorage};
pub use memory::{InMemoryStorage, InMemoryStorageBuilder, DEFAULT_BUCKETS};
