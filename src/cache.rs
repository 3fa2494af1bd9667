//! Loading-cache façade.
//!
//! [`LoadingCache`] is the entry point for primary-key lookups: it reads
//! the storage first and falls back to its [`SourceLoader`] for the
//! keys the storage could not answer.
//!
//! ## Core Operations
//!
//! - [`get_or_load`](LoadingCache::get_or_load): storage hit or single
//!   load.
//! - [`get_or_load_multi`](LoadingCache::get_or_load_multi): batched
//!   variant; only the residual misses are sent to the loader, and the
//!   loaded entries are spliced back into their input positions.
//!
//! Negative-cache hits resolve to `None` without touching the source;
//! that a key is confirmed-absent is invisible to callers.

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::CacheError;
use crate::traits::{CacheKey, CacheStorage, CacheValue, SourceLoader};

/// A read-through cache over a storage and a loader.
///
/// Cheap to clone; clones share the same storage and loader.
///
/// # Example
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use std::sync::Arc;
/// use std::time::{Duration, Instant};
/// use readthrough::cache::LoadingCache;
/// use readthrough::entry::CacheEntry;
/// use readthrough::loader::SingleFlightLoader;
/// use readthrough::source::GetMultiSource;
/// use readthrough::storage::InMemoryStorage;
///
/// let storage = Arc::new(InMemoryStorage::<u64, String>::new());
/// let source = Arc::new(GetMultiSource::new(|keys: Vec<u64>| async move {
///     Ok(keys
///         .into_iter()
///         .map(|k| {
///             Some(CacheEntry::new(
///                 k,
///                 format!("user-{k}"),
///                 Instant::now() + Duration::from_secs(60),
///             ))
///         })
///         .collect())
/// }));
/// let loader = Arc::new(SingleFlightLoader::new(
///     Arc::clone(&storage) as Arc<dyn readthrough::traits::CacheStorage<u64, String>>,
///     source,
/// ));
///
/// let cache = LoadingCache::new(storage, loader);
/// let entry = cache.get_or_load(&7).await.unwrap().unwrap();
/// assert_eq!(entry.value, "user-7");
/// # }
/// ```
pub struct LoadingCache<K, V> {
    storage: Arc<dyn CacheStorage<K, V>>,
    loader: Arc<dyn SourceLoader<K, V>>,
}

impl<K, V> Clone for LoadingCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            loader: Arc::clone(&self.loader),
        }
    }
}

impl<K, V> std::fmt::Debug for LoadingCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingCache").finish_non_exhaustive()
    }
}

impl<K, V> LoadingCache<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Creates a cache over `storage` and `loader`.
    ///
    /// The loader must write into the same storage for cache-first reads
    /// to observe loaded values.
    pub fn new(storage: Arc<dyn CacheStorage<K, V>>, loader: Arc<dyn SourceLoader<K, V>>) -> Self {
        Self { storage, loader }
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &Arc<dyn CacheStorage<K, V>> {
        &self.storage
    }

    /// Retrieves the value for `key`, loading it from the source on a
    /// cache miss.
    ///
    /// Returns `Ok(None)` if the key does not exist upstream (including
    /// the negative-cached case).
    pub async fn get_or_load(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError> {
        if let Some(cached) = self.storage.get(key).await? {
            if cached.is_negative() {
                return Ok(None);
            }
            return Ok(cached.into_entry());
        }
        self.loader.load_and_store(key).await
    }

    /// Retrieves values for `keys`, loading the misses from the source.
    ///
    /// The result is positionally aligned: slot `i` answers `keys[i]`,
    /// with `None` for keys that do not exist upstream.
    pub async fn get_or_load_multi(
        &self,
        keys: &[K],
    ) -> Result<Vec<Option<Entry<K, V>>>, CacheError> {
        let cached = self.storage.get_multi(keys).await?;

        let mut entries: Vec<Option<Entry<K, V>>> = Vec::with_capacity(keys.len());
        let mut missing_positions = Vec::new();
        for (position, slot) in cached.into_iter().enumerate() {
            match slot {
                Some(entry) if entry.is_negative() => entries.push(None),
                Some(entry) => entries.push(entry.into_entry()),
                None => {
                    entries.push(None);
                    missing_positions.push(position);
                },
            }
        }
        if missing_positions.is_empty() {
            return Ok(entries);
        }

        let missing_keys: Vec<K> = missing_positions
            .iter()
            .map(|&position| keys[position].clone())
            .collect();
        let loaded = self.loader.load_and_store_multi(&missing_keys).await?;

        for (position, entry) in missing_positions.into_iter().zip(loaded) {
            entries[position] = entry;
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
