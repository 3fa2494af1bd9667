//! Adapters for building and hardening [`LoadingSource`] implementations.
//!
//! ## Key Components
//!
//! - [`FunctionsSource`]: two user closures, one per operation.
//! - [`GetMultiSource`]: a single batched closure serving both
//!   operations (single-key lookups go through a one-element batch).
//! - [`MapSource`]: a batched closure returning a map, re-aligned to the
//!   positional contract.
//! - [`CompactSource`]: contract repair for sources whose batched
//!   results omit missing keys instead of returning aligned `None`
//!   slots.
//! - [`ValidatingSource`]: asserts the source contract at runtime and
//!   treats violations as programmer errors (panics).

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::future::Future;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::traits::{CacheKey, CacheValue, LoadingSource};

type GetFn<K, V> =
    Box<dyn Fn(K) -> BoxFuture<'static, Result<Option<CacheEntry<K, V>>, CacheError>> + Send + Sync>;
type GetMultiFn<K, V> = Box<
    dyn Fn(Vec<K>) -> BoxFuture<'static, Result<Vec<Option<CacheEntry<K, V>>>, CacheError>>
        + Send
        + Sync,
>;

/// A [`LoadingSource`] backed by two user closures.
pub struct FunctionsSource<K, V> {
    get_fn: GetFn<K, V>,
    get_multi_fn: GetMultiFn<K, V>,
}

impl<K, V> FunctionsSource<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Creates a source from a single-key closure and a batched closure.
    pub fn new<G, GFut, GM, GMFut>(get: G, get_multi: GM) -> Self
    where
        G: Fn(K) -> GFut + Send + Sync + 'static,
        GFut: Future<Output = Result<Option<CacheEntry<K, V>>, CacheError>> + Send + 'static,
        GM: Fn(Vec<K>) -> GMFut + Send + Sync + 'static,
        GMFut:
            Future<Output = Result<Vec<Option<CacheEntry<K, V>>>, CacheError>> + Send + 'static,
    {
        Self {
            get_fn: Box::new(move |key| get(key).boxed()),
            get_multi_fn: Box::new(move |keys| get_multi(keys).boxed()),
        }
    }
}

#[async_trait]
impl<K, V> LoadingSource<K, V> for FunctionsSource<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        (self.get_fn)(key.clone()).await
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        (self.get_multi_fn)(keys.to_vec()).await
    }
}

/// A [`LoadingSource`] backed by one batched closure.
///
/// Single-key lookups are served through a one-element batch.
pub struct GetMultiSource<F> {
    get_multi_fn: F,
}

impl<F> GetMultiSource<F> {
    /// Creates a source from the batched closure.
    pub fn new(get_multi_fn: F) -> Self {
        Self { get_multi_fn }
    }
}

#[async_trait]
impl<K, V, F, Fut> LoadingSource<K, V> for GetMultiSource<F>
where
    K: CacheKey,
    V: CacheValue,
    F: Fn(Vec<K>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Option<CacheEntry<K, V>>>, CacheError>> + Send,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        let entries = (self.get_multi_fn)(vec![key.clone()]).await?;
        Ok(entries.into_iter().next().flatten())
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        (self.get_multi_fn)(keys.to_vec()).await
    }
}

/// A [`LoadingSource`] backed by one batched closure returning a map.
///
/// The map is re-aligned to the positional contract: for each input key,
/// the output slot holds the map's entry for that key, or `None`.
pub struct MapSource<F> {
    get_multi_fn: F,
}

impl<F> MapSource<F> {
    /// Creates a source from the batched map closure.
    pub fn new(get_multi_fn: F) -> Self {
        Self { get_multi_fn }
    }
}

#[async_trait]
impl<K, V, F, Fut> LoadingSource<K, V> for MapSource<F>
where
    K: CacheKey,
    V: CacheValue,
    F: Fn(Vec<K>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HashMap<K, CacheEntry<K, V>>, CacheError>> + Send,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        let mut entries = (self.get_multi_fn)(vec![key.clone()]).await?;
        Ok(entries.remove(key))
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        let mut entries = (self.get_multi_fn)(keys.to_vec()).await?;
        Ok(keys.iter().map(|key| entries.remove(key)).collect())
    }
}

/// Contract repair for sources whose batched results omit missing keys.
///
/// The raw [`LoadingSource`] contract requires one positionally aligned
/// slot per input key. Some upstream APIs instead return only the
/// entries they found. This decorator detects the short result and
/// re-aligns it by key, filling `None` for the omitted positions.
/// Results that already have the right length pass through untouched.
#[derive(Debug)]
pub struct CompactSource<S> {
    source: S,
}

impl<S> CompactSource<S> {
    /// Wraps `source`, permitting omission of missing keys in batched
    /// results.
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<K, V, S> LoadingSource<K, V> for CompactSource<S>
where
    K: CacheKey,
    V: CacheValue,
    S: LoadingSource<K, V>,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        self.source.get(key).await
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        let entries = self.source.get_multi(keys).await?;
        if entries.len() == keys.len() {
            return Ok(entries);
        }

        let mut by_key: FxHashMap<K, CacheEntry<K, V>> = FxHashMap::default();
        for entry in entries.into_iter().flatten() {
            by_key.insert(entry.key().clone(), entry);
        }
        Ok(keys.iter().map(|key| by_key.remove(key)).collect())
    }
}

/// Runtime assertion of the [`LoadingSource`] contract.
///
/// Wraps a source and verifies on every result that entry keys match the
/// requested keys and that batched results are positionally aligned.
/// Violations indicate a broken source implementation and are treated as
/// programmer errors: the wrapper panics.
#[derive(Debug)]
pub struct ValidatingSource<S> {
    source: S,
}

impl<S> ValidatingSource<S> {
    /// Wraps `source` with contract assertions.
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<K, V, S> LoadingSource<K, V> for ValidatingSource<S>
where
    K: CacheKey,
    V: CacheValue,
    S: LoadingSource<K, V>,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        let entry = self.source.get(key).await?;
        if let Some(entry) = &entry {
            assert!(
                entry.key() == key,
                "source returned an entry for a different key than requested",
            );
        }
        Ok(entry)
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        let entries = self.source.get_multi(keys).await?;
        assert!(
            entries.len() == keys.len(),
            "source must return one slot per requested key, in request order \
             (got {} slots for {} keys)",
            entries.len(),
            keys.len(),
        );
        for (key, entry) in keys.iter().zip(&entries) {
            if let Some(entry) = entry {
                assert!(
                    entry.key() == key,
                    "source returned entries out of order with the requested keys",
                );
            }
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
