//! Secondary-key indexes: refreshable on-memory snapshots, composite
//! combinators, and the background refresh driver.

pub mod adapters;
pub mod composite;
pub mod keys;
pub mod memory;
pub mod refresher;

pub use adapters::{FunctionsIndex, IndexSourceFn};
pub use composite::{IntersectionIndex, UnionIndex};
pub use keys::CompositeKey;
pub use memory::SnapshotIndex;
pub use refresher::IntervalRefresher;
