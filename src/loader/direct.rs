//! Direct (uncoalesced) source loader.

use std::sync::Arc;

use async_trait::async_trait;

use crate::entry::{CacheEntry, Entry};
use crate::error::CacheError;
use crate::traits::{CacheKey, CacheStorage, CacheValue, LoadingSource, SourceLoader};

/// A [`SourceLoader`] that fetches and stores inline, with no
/// coalescing.
///
/// Every call performs its own source fetch. Suitable for sequential
/// workloads and as a reference implementation in tests; concurrent
/// workloads should use
/// [`SingleFlightLoader`](crate::loader::SingleFlightLoader) instead.
pub struct DirectLoader<K, V> {
    storage: Arc<dyn CacheStorage<K, V>>,
    source: Arc<dyn LoadingSource<K, V>>,
}

impl<K, V> DirectLoader<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Creates a loader over the given storage and source.
    pub fn new(
        storage: Arc<dyn CacheStorage<K, V>>,
        source: Arc<dyn LoadingSource<K, V>>,
    ) -> Self {
        Self { storage, source }
    }
}

#[async_trait]
impl<K, V> SourceLoader<K, V> for DirectLoader<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    async fn load_and_store(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError> {
        let Some(entry) = self.source.get(key).await? else {
            return Ok(None);
        };
        self.storage.set(&entry).await?;
        if entry.is_negative() {
            return Ok(None);
        }
        Ok(entry.into_entry())
    }

    async fn load_and_store_multi(
        &self,
        keys: &[K],
    ) -> Result<Vec<Option<Entry<K, V>>>, CacheError> {
        let entries = self.source.get_multi(keys).await?;
        self.storage.set_multi(&entries).await?;
        Ok(entries
            .into_iter()
            .map(|slot| {
                slot.filter(|entry| !entry.is_negative())
                    .and_then(CacheEntry::into_entry)
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::source::GetMultiSource;
    use crate::storage::InMemoryStorage;

    fn fresh_entry(key: u64, value: &str) -> CacheEntry<u64, String> {
        CacheEntry::new(key, value.to_string(), Instant::now() + Duration::from_secs(60))
    }

    #[tokio::test]
    async fn load_and_store_persists_and_returns() {
        let storage = Arc::new(InMemoryStorage::<u64, String>::new());
        let source = Arc::new(GetMultiSource::new(|keys: Vec<u64>| async move {
            Ok(keys.into_iter().map(|k| Some(fresh_entry(k, "v"))).collect())
        }));
        let loader = DirectLoader::new(
            Arc::clone(&storage) as Arc<dyn CacheStorage<u64, String>>,
            source,
        );

        let entry = loader.load_and_store(&1).await.unwrap().unwrap();
        assert_eq!(entry.value, "v");
        assert!(storage.get(&1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn misses_are_not_stored() {
        let storage = Arc::new(InMemoryStorage::<u64, String>::new());
        let source = Arc::new(GetMultiSource::new(|keys: Vec<u64>| async move {
            Ok(keys.into_iter().map(|_| None).collect())
        }));
        let loader = DirectLoader::new(
            Arc::clone(&storage) as Arc<dyn CacheStorage<u64, String>>,
            source,
        );

        assert!(loader.load_and_store(&1).await.unwrap().is_none());
        assert!(storage.get(&1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batched_load_hides_negative_entries() {
        let storage = Arc::new(InMemoryStorage::<u64, String>::new());
        let source = Arc::new(GetMultiSource::new(|keys: Vec<u64>| async move {
            Ok(keys
                .into_iter()
                .map(|k| {
                    if k % 2 == 0 {
                        Some(CacheEntry::negative(k, Instant::now() + Duration::from_secs(60)))
                    } else {
                        Some(fresh_entry(k, "odd"))
                    }
                })
                .collect())
        }));
        let loader = DirectLoader::new(
            Arc::clone(&storage) as Arc<dyn CacheStorage<u64, String>>,
            source,
        );

        let batch = loader.load_and_store_multi(&[1, 2]).await.unwrap();
        assert!(batch[0].is_some());
        assert!(batch[1].is_none());
        // The negative entry is persisted even though it is hidden.
        assert!(storage.get(&2).await.unwrap().unwrap().is_negative());
    }
}
