//! Sharded in-memory cache storage.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     InMemoryStorage<K, V>                       │
//! │                                                                 │
//! │   key ──► key_hash(key) % N ──► bucket index                    │
//! │                                                                 │
//! │   ┌──────────────┬──────────────┬─────┬──────────────┐          │
//! │   │  bucket 0    │  bucket 1    │ ... │  bucket N-1  │          │
//! │   │  RwLock<map> │  RwLock<map> │     │  RwLock<map> │          │
//! │   └──────────────┴──────────────┴─────┴──────────────┘          │
//! │                                                                 │
//! │   multi-key ops lock distinct buckets in ascending index order  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Sharding**: keys are distributed over `N` independently locked
//!   buckets (default 256) so readers and writers of unrelated keys do
//!   not contend.
//! - **Deterministic lock order**: batched operations sort the distinct
//!   bucket indices and acquire locks in ascending order, so two batched
//!   operations over overlapping bucket sets can never deadlock.
//! - **Clone on ingress and egress**: every entry is cloned through the
//!   configured [`ValueCloner`] when it enters or leaves the storage.
//!   Nothing a caller holds ever aliases storage-internal state.
//! - **Lazy expiration**: expired entries are reported as absent but may
//!   remain physically present until overwritten. There is no sweeper.
//!
//! ## Example Usage
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use std::time::{Duration, Instant};
//! use readthrough::entry::CacheEntry;
//! use readthrough::storage::InMemoryStorage;
//! use readthrough::traits::CacheStorage;
//!
//! let storage = InMemoryStorage::<u64, String>::new();
//! let entry = CacheEntry::new(1, "one".to_string(), Instant::now() + Duration::from_secs(60));
//! storage.set(&entry).await.unwrap();
//!
//! let hit = storage.get(&1).await.unwrap().unwrap();
//! assert_eq!(hit.value(), Some(&"one".to_string()));
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! All operations take `&self` and are safe for concurrent invocation.
//! Bucket locks are `parking_lot::RwLock`; operations complete
//! synchronously and never suspend while holding a lock.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::clock::{Clock, SystemClock};
use crate::cloner::{CloneCloner, ValueCloner};
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::expiration::{ExpirationPolicy, GeneralExpiration};
use crate::keyhash::StableHash;
use crate::traits::{CacheKey, CacheStorage, CacheValue};

/// Default number of buckets.
pub const DEFAULT_BUCKETS: usize = 256;

type Bucket<K, V> = RwLock<FxHashMap<K, CacheEntry<K, V>>>;
type KeyHashFn<K> = Box<dyn Fn(&K) -> u64 + Send + Sync>;

/// Sharded in-memory [`CacheStorage`] with TTL expiration and negative
/// caching.
///
/// Construct via [`InMemoryStorage::new`] for the defaults or
/// [`InMemoryStorage::builder`] to override the bucket count, key hash,
/// clock, expiration policy, or value cloner.
pub struct InMemoryStorage<K, V> {
    buckets: Vec<Bucket<K, V>>,
    key_hash: KeyHashFn<K>,
    clock: Arc<dyn Clock>,
    expiration: Arc<dyn ExpirationPolicy>,
    cloner: Arc<dyn ValueCloner<V>>,
}

impl<K, V> fmt::Debug for InMemoryStorage<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("buckets", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> InMemoryStorage<K, V>
where
    K: CacheKey + StableHash,
    V: CacheValue + Clone,
{
    /// Creates a storage with default configuration: 256 buckets, the
    /// stable FNV-1a key hash, the system clock, standard expiration,
    /// and `Clone`-based value duplication.
    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl<K, V> Default for InMemoryStorage<K, V>
where
    K: CacheKey + StableHash,
    V: CacheValue + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InMemoryStorage<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Returns a builder with default settings.
    pub fn builder() -> InMemoryStorageBuilder<K, V> {
        InMemoryStorageBuilder::new()
    }

    /// Returns the number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_index(&self, key: &K) -> usize {
        ((self.key_hash)(key) % self.buckets.len() as u64) as usize
    }

    /// Resolves the bucket index of each key plus the sorted list of
    /// distinct bucket indices touched.
    fn resolve_buckets<'a>(
        &self,
        keys: impl Iterator<Item = &'a K>,
    ) -> (Vec<usize>, Vec<usize>) {
        let mut per_key = Vec::new();
        let mut distinct = Vec::new();
        for key in keys {
            let index = self.bucket_index(key);
            per_key.push(index);
            if !distinct.contains(&index) {
                distinct.push(index);
            }
        }
        distinct.sort_unstable();
        (per_key, distinct)
    }
}

#[async_trait]
impl<K, V> CacheStorage<K, V> for InMemoryStorage<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        let bucket = self.buckets[self.bucket_index(key)].read();
        let now = self.clock.now();
        Ok(bucket
            .get(key)
            .filter(|entry| !self.expiration.is_expired(now, entry.expires_at()))
            .map(|entry| entry.clone_via(&*self.cloner)))
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        let (per_key, distinct) = self.resolve_buckets(keys.iter());

        // Ascending acquisition order prevents deadlock against any
        // concurrent multi-bucket operation.
        let mut position = FxHashMap::default();
        let mut guards = Vec::with_capacity(distinct.len());
        for index in distinct {
            position.insert(index, guards.len());
            guards.push(self.buckets[index].read());
        }

        let now = self.clock.now();
        let mut result = Vec::with_capacity(keys.len());
        for (key, bucket_index) in keys.iter().zip(per_key) {
            let bucket = &guards[position[&bucket_index]];
            result.push(
                bucket
                    .get(key)
                    .filter(|entry| !self.expiration.is_expired(now, entry.expires_at()))
                    .map(|entry| entry.clone_via(&*self.cloner)),
            );
        }
        Ok(result)
    }

    async fn set(&self, entry: &CacheEntry<K, V>) -> Result<(), CacheError> {
        let mut bucket = self.buckets[self.bucket_index(entry.key())].write();
        bucket.insert(entry.key().clone(), entry.clone_via(&*self.cloner));
        Ok(())
    }

    async fn set_multi(&self, entries: &[Option<CacheEntry<K, V>>]) -> Result<(), CacheError> {
        let present: Vec<&CacheEntry<K, V>> = entries.iter().flatten().collect();
        if present.is_empty() {
            return Ok(());
        }

        let (per_key, distinct) = self.resolve_buckets(present.iter().map(|entry| entry.key()));

        let mut position = FxHashMap::default();
        let mut guards = Vec::with_capacity(distinct.len());
        for index in distinct {
            position.insert(index, guards.len());
            guards.push(self.buckets[index].write());
        }

        for (entry, bucket_index) in present.iter().zip(per_key) {
            let bucket = &mut guards[position[&bucket_index]];
            bucket.insert(entry.key().clone(), entry.clone_via(&*self.cloner));
        }
        Ok(())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`InMemoryStorage`].
///
/// # Example
///
/// ```
/// use readthrough::clock::SystemClock;
/// use readthrough::expiration::GeneralExpiration;
/// use readthrough::storage::InMemoryStorage;
///
/// let storage = InMemoryStorage::<String, u64>::builder()
///     .buckets(64)
///     .clock(SystemClock)
///     .expiration(GeneralExpiration)
///     .build();
/// assert_eq!(storage.bucket_count(), 64);
/// ```
pub struct InMemoryStorageBuilder<K, V> {
    buckets: usize,
    key_hash: Option<KeyHashFn<K>>,
    clock: Arc<dyn Clock>,
    expiration: Arc<dyn ExpirationPolicy>,
    cloner: Option<Arc<dyn ValueCloner<V>>>,
}

impl<K, V> InMemoryStorageBuilder<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    fn new() -> Self {
        Self {
            buckets: DEFAULT_BUCKETS,
            key_hash: None,
            clock: Arc::new(SystemClock),
            expiration: Arc::new(GeneralExpiration),
            cloner: None,
        }
    }

    /// Sets the bucket count (clamped to at least 1). The count is fixed
    /// for the lifetime of the storage.
    pub fn buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets.max(1);
        self
    }

    /// Overrides the key-to-hash function used for bucket selection.
    ///
    /// The default hashes keys with [`StableHash`].
    pub fn key_hash(mut self, key_hash: impl Fn(&K) -> u64 + Send + Sync + 'static) -> Self {
        self.key_hash = Some(Box::new(key_hash));
        self
    }

    /// Overrides the clock used for expiration checks.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Overrides the expiration policy.
    pub fn expiration(mut self, expiration: impl ExpirationPolicy + 'static) -> Self {
        self.expiration = Arc::new(expiration);
        self
    }

    /// Overrides the value cloner used on entry ingress and egress.
    pub fn cloner(mut self, cloner: impl ValueCloner<V> + 'static) -> Self {
        self.cloner = Some(Arc::new(cloner));
        self
    }

    /// Builds the storage.
    pub fn build(self) -> InMemoryStorage<K, V>
    where
        K: StableHash,
        V: Clone,
    {
        let key_hash = self
            .key_hash
            .unwrap_or_else(|| Box::new(|key: &K| key.stable_hash()));
        let cloner = self
            .cloner
            .unwrap_or_else(|| Arc::new(CloneCloner));
        let buckets = (0..self.buckets)
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect();
        InMemoryStorage {
            buckets,
            key_hash,
            clock: self.clock,
            expiration: self.expiration,
            cloner,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::clock::ManualClock;
    use crate::cloner::FnCloner;

    fn entry(key: u64, value: &str, expires_at: Instant) -> CacheEntry<u64, String> {
        CacheEntry::new(key, value.to_string(), expires_at)
    }

    #[tokio::test]
    async fn get_returns_fresh_entries_only() {
        let start = Instant::now();
        let storage = InMemoryStorage::<u64, String>::builder()
            .clock(ManualClock::new(start))
            .build();

        storage
            .set(&entry(1, "a", start + Duration::from_secs(60)))
            .await
            .unwrap();

        let hit = storage.get(&1).await.unwrap().unwrap();
        assert_eq!(hit.value(), Some(&"a".to_string()));
        assert!(storage.get(&2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_absent_at_the_exact_deadline() {
        let start = Instant::now();
        let clock = Arc::new(ManualClock::new(start));
        let storage = InMemoryStorage::<u64, String>::builder()
            .clock(Arc::clone(&clock))
            .build();

        let deadline = start + Duration::from_secs(3600);
        storage.set(&entry(1, "x", deadline)).await.unwrap();

        clock.set(deadline - Duration::from_secs(1));
        assert!(storage.get(&1).await.unwrap().is_some());

        clock.set(deadline);
        assert!(storage.get(&1).await.unwrap().is_none());

        clock.set(deadline + Duration::from_secs(1));
        assert!(storage.get(&1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_overwrites_previous_entry() {
        let start = Instant::now();
        let storage = InMemoryStorage::<u64, String>::builder()
            .clock(ManualClock::new(start))
            .build();
        let deadline = start + Duration::from_secs(60);

        storage.set(&entry(1, "old", deadline)).await.unwrap();
        storage.set(&entry(1, "new", deadline)).await.unwrap();

        let hit = storage.get(&1).await.unwrap().unwrap();
        assert_eq!(hit.value(), Some(&"new".to_string()));
    }

    #[tokio::test]
    async fn get_multi_is_positionally_aligned() {
        let start = Instant::now();
        let storage = InMemoryStorage::<u64, String>::builder()
            .buckets(4)
            .clock(ManualClock::new(start))
            .build();
        let deadline = start + Duration::from_secs(60);

        storage
            .set_multi(&[
                Some(entry(1, "a", deadline)),
                None,
                Some(entry(3, "c", deadline)),
            ])
            .await
            .unwrap();

        let result = storage.get_multi(&[3, 2, 1]).await.unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].as_ref().unwrap().value(), Some(&"c".to_string()));
        assert!(result[1].is_none());
        assert_eq!(result[2].as_ref().unwrap().value(), Some(&"a".to_string()));
    }

    #[tokio::test]
    async fn get_multi_handles_duplicate_keys() {
        let start = Instant::now();
        let storage = InMemoryStorage::<u64, String>::builder()
            .buckets(2)
            .clock(ManualClock::new(start))
            .build();
        storage
            .set(&entry(5, "v", start + Duration::from_secs(60)))
            .await
            .unwrap();

        let result = storage.get_multi(&[5, 5, 5]).await.unwrap();
        assert!(result.iter().all(|slot| slot.is_some()));
    }

    #[tokio::test]
    async fn single_bucket_storage_works() {
        let start = Instant::now();
        let storage = InMemoryStorage::<u64, String>::builder()
            .buckets(1)
            .clock(ManualClock::new(start))
            .build();
        let deadline = start + Duration::from_secs(60);

        storage
            .set_multi(&[Some(entry(1, "a", deadline)), Some(entry(2, "b", deadline))])
            .await
            .unwrap();
        let result = storage.get_multi(&[1, 2]).await.unwrap();
        assert!(result[0].is_some() && result[1].is_some());
    }

    #[tokio::test]
    async fn zero_bucket_request_is_clamped() {
        let storage = InMemoryStorage::<u64, String>::builder().buckets(0).build();
        assert_eq!(storage.bucket_count(), 1);
    }

    #[tokio::test]
    async fn negative_entries_survive_storage_without_cloning_a_value() {
        let start = Instant::now();
        let storage = InMemoryStorage::<u64, String>::builder()
            .clock(ManualClock::new(start))
            .cloner(FnCloner::new(|_: &String| panic!("negative entries have no value to clone")))
            .build();

        let negative = CacheEntry::<u64, String>::negative(7, start + Duration::from_secs(60));
        storage.set(&negative).await.unwrap();

        let hit = storage.get(&7).await.unwrap().unwrap();
        assert!(hit.is_negative());
    }

    #[tokio::test]
    async fn egress_entries_do_not_alias_stored_state() {
        let start = Instant::now();
        let storage = InMemoryStorage::<u64, Vec<u32>>::builder()
            .clock(ManualClock::new(start))
            .build();
        let deadline = start + Duration::from_secs(60);

        storage
            .set(&CacheEntry::new(1, vec![1, 2], deadline))
            .await
            .unwrap();

        // Mutating a returned value must not affect later reads.
        let mut first = storage.get(&1).await.unwrap().unwrap().into_entry().unwrap();
        first.value.push(99);

        let second = storage.get(&1).await.unwrap().unwrap();
        assert_eq!(second.value(), Some(&vec![1, 2]));
    }

    #[tokio::test]
    async fn custom_key_hash_controls_bucket_selection() {
        let start = Instant::now();
        // All keys into one bucket; correctness must not depend on spread.
        let storage = InMemoryStorage::<u64, String>::builder()
            .buckets(8)
            .key_hash(|_key| 3)
            .clock(ManualClock::new(start))
            .build();
        let deadline = start + Duration::from_secs(60);

        for key in 0..16 {
            storage.set(&entry(key, "v", deadline)).await.unwrap();
        }
        let result = storage.get_multi(&(0..16).collect::<Vec<_>>()).await.unwrap();
        assert!(result.iter().all(|slot| slot.is_some()));
    }
}
