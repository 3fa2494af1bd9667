//! Convenience re-exports for the common wiring path.

pub use crate::cache::LoadingCache;
pub use crate::clock::{Clock, ManualClock, RandomizedClock, SystemClock};
pub use crate::cloner::{CloneCloner, FnCloner, ValueCloner};
pub use crate::entry::{CacheEntry, Entry};
pub use crate::error::CacheError;
pub use crate::expiration::{
    EarlyExpiration, ExpirationPolicy, GeneralExpiration, NeverExpiration,
};
pub use crate::index::{
    CompositeKey, FunctionsIndex, IndexSourceFn, IntersectionIndex, IntervalRefresher,
    SnapshotIndex, UnionIndex,
};
pub use crate::indexed::IndexedLoadingCache;
pub use crate::keyhash::StableHash;
pub use crate::loader::{DirectLoader, SingleFlightLoader};
pub use crate::source::{CompactSource, FunctionsSource, GetMultiSource, MapSource, ValidatingSource};
pub use crate::storage::{InMemoryStorage, SilentErrorStorage};
pub use crate::traits::{
    CacheKey, CacheStorage, CacheValue, Index, IndexSource, LoadingSource, RefreshIndex,
    SourceLoader,
};
