//! Storage decorators and closure-backed storage.

use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::traits::{CacheKey, CacheStorage, CacheValue};

type ErrorHandler = Box<dyn Fn(&CacheError) + Send + Sync>;

/// A decorator that swallows storage errors instead of propagating them.
///
/// For read-through caching, a broken storage backend is often preferable
/// to a failed request: a swallowed `get` error degrades to a cache miss
/// and the value is fetched from the source; a swallowed `set` error
/// means the value is simply not cached this time. Each swallowed error
/// is handed to the configured handler (and logged at debug level).
pub struct SilentErrorStorage<St> {
    storage: St,
    on_error: Option<ErrorHandler>,
}

impl<St> SilentErrorStorage<St> {
    /// Wraps `storage`, silently discarding its errors.
    pub fn new(storage: St) -> Self {
        Self {
            storage,
            on_error: None,
        }
    }

    /// Registers a handler invoked with every swallowed error.
    pub fn with_error_handler(
        mut self,
        on_error: impl Fn(&CacheError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    fn swallow(&self, err: CacheError) {
        tracing::debug!(error = %err, "storage error silenced");
        if let Some(handler) = &self.on_error {
            handler(&err);
        }
    }
}

impl<St: fmt::Debug> fmt::Debug for SilentErrorStorage<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SilentErrorStorage")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<K, V, St> CacheStorage<K, V> for SilentErrorStorage<St>
where
    K: CacheKey,
    V: CacheValue,
    St: CacheStorage<K, V>,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        match self.storage.get(key).await {
            Ok(entry) => Ok(entry),
            Err(err) => {
                self.swallow(err);
                Ok(None)
            },
        }
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        match self.storage.get_multi(keys).await {
            Ok(entries) => Ok(entries),
            Err(err) => {
                self.swallow(err);
                Ok(keys.iter().map(|_| None).collect())
            },
        }
    }

    async fn set(&self, entry: &CacheEntry<K, V>) -> Result<(), CacheError> {
        if let Err(err) = self.storage.set(entry).await {
            self.swallow(err);
        }
        Ok(())
    }

    async fn set_multi(&self, entries: &[Option<CacheEntry<K, V>>]) -> Result<(), CacheError> {
        if let Err(err) = self.storage.set_multi(entries).await {
            self.swallow(err);
        }
        Ok(())
    }
}

type GetFn<K, V> =
    Box<dyn Fn(K) -> BoxFuture<'static, Result<Option<CacheEntry<K, V>>, CacheError>> + Send + Sync>;
type GetMultiFn<K, V> = Box<
    dyn Fn(Vec<K>) -> BoxFuture<'static, Result<Vec<Option<CacheEntry<K, V>>>, CacheError>>
        + Send
        + Sync,
>;
type SetFn<K, V> =
    Box<dyn Fn(CacheEntry<K, V>) -> BoxFuture<'static, Result<(), CacheError>> + Send + Sync>;
type SetMultiFn<K, V> = Box<
    dyn Fn(Vec<Option<CacheEntry<K, V>>>) -> BoxFuture<'static, Result<(), CacheError>>
        + Send
        + Sync,
>;

/// A [`CacheStorage`] backed by four user closures.
///
/// The shim for wiring an external backend (Redis, memcached, a test
/// double) without a dedicated type.
pub struct FunctionsStorage<K, V> {
    get_fn: GetFn<K, V>,
    get_multi_fn: GetMultiFn<K, V>,
    set_fn: SetFn<K, V>,
    set_multi_fn: SetMultiFn<K, V>,
}

impl<K, V> FunctionsStorage<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Creates a storage from the four operation closures.
    pub fn new<G, GFut, GM, GMFut, S, SFut, SM, SMFut>(
        get: G,
        get_multi: GM,
        set: S,
        set_multi: SM,
    ) -> Self
    where
        G: Fn(K) -> GFut + Send + Sync + 'static,
        GFut: std::future::Future<Output = Result<Option<CacheEntry<K, V>>, CacheError>>
            + Send
            + 'static,
        GM: Fn(Vec<K>) -> GMFut + Send + Sync + 'static,
        GMFut: std::future::Future<Output = Result<Vec<Option<CacheEntry<K, V>>>, CacheError>>
            + Send
            + 'static,
        S: Fn(CacheEntry<K, V>) -> SFut + Send + Sync + 'static,
        SFut: std::future::Future<Output = Result<(), CacheError>> + Send + 'static,
        SM: Fn(Vec<Option<CacheEntry<K, V>>>) -> SMFut + Send + Sync + 'static,
        SMFut: std::future::Future<Output = Result<(), CacheError>> + Send + 'static,
    {
        Self {
            get_fn: Box::new(move |key| get(key).boxed()),
            get_multi_fn: Box::new(move |keys| get_multi(keys).boxed()),
            set_fn: Box::new(move |entry| set(entry).boxed()),
            set_multi_fn: Box::new(move |entries| set_multi(entries).boxed()),
        }
    }
}

#[async_trait]
impl<K, V> CacheStorage<K, V> for FunctionsStorage<K, V>
where
    K: CacheKey,
    V: CacheValue + Clone,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        (self.get_fn)(key.clone()).await
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        (self.get_multi_fn)(keys.to_vec()).await
    }

    async fn set(&self, entry: &CacheEntry<K, V>) -> Result<(), CacheError> {
        (self.set_fn)(entry.clone()).await
    }

    async fn set_multi(&self, entries: &[Option<CacheEntry<K, V>>]) -> Result<(), CacheError> {
        (self.set_multi_fn)(entries.to_vec()).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;

    struct FailingStorage;

    #[async_trait]
    impl CacheStorage<u64, String> for FailingStorage {
        async fn get(&self, _key: &u64) -> Result<Option<CacheEntry<u64, String>>, CacheError> {
            Err(CacheError::storage(std::io::Error::other("down")))
        }

        async fn get_multi(
            &self,
            _keys: &[u64],
        ) -> Result<Vec<Option<CacheEntry<u64, String>>>, CacheError> {
            Err(CacheError::storage(std::io::Error::other("down")))
        }

        async fn set(&self, _entry: &CacheEntry<u64, String>) -> Result<(), CacheError> {
            Err(CacheError::storage(std::io::Error::other("down")))
        }

        async fn set_multi(
            &self,
            _entries: &[Option<CacheEntry<u64, String>>],
        ) -> Result<(), CacheError> {
            Err(CacheError::storage(std::io::Error::other("down")))
        }
    }

    #[tokio::test]
    async fn silent_storage_swallows_errors_and_reports_them() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = Arc::clone(&seen);
        let storage = SilentErrorStorage::new(FailingStorage)
            .with_error_handler(move |_err| {
                seen_in_handler.fetch_add(1, Ordering::Relaxed);
            });

        assert!(storage.get(&1).await.unwrap().is_none());
        let multi = storage.get_multi(&[1, 2]).await.unwrap();
        assert_eq!(multi.len(), 2);
        assert!(multi.iter().all(|slot| slot.is_none()));
        let entry = CacheEntry::new(1, "v".to_string(), Instant::now() + Duration::from_secs(1));
        storage.set(&entry).await.unwrap();
        storage.set_multi(&[Some(entry)]).await.unwrap();

        assert_eq!(seen.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn functions_storage_routes_to_closures() {
        let sets = Arc::new(AtomicUsize::new(0));
        let sets_in_closure = Arc::clone(&sets);
        let storage = FunctionsStorage::<u64, String>::new(
            |key| async move {
                Ok(Some(CacheEntry::new(
                    key,
                    format!("v{key}"),
                    Instant::now() + Duration::from_secs(60),
                )))
            },
            |keys| async move { Ok(keys.into_iter().map(|_| None).collect()) },
            move |_entry| {
                let sets = Arc::clone(&sets_in_closure);
                async move {
                    sets.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
            },
            |_entries| async move { Ok(()) },
        );

        let hit = storage.get(&3).await.unwrap().unwrap();
        assert_eq!(hit.value(), Some(&"v3".to_string()));

        let entry = CacheEntry::new(1, "v".to_string(), Instant::now() + Duration::from_secs(1));
        storage.set(&entry).await.unwrap();
        assert_eq!(sets.load(Ordering::Relaxed), 1);
    }
}
