//! Core trait seams of the loading cache.
//!
//! ## Architecture
//!
//! ```text
//!   caller ──► LoadingCache ──► CacheStorage          (hit: return)
//!                  │
//!                  └──────────► SourceLoader ──► LoadingSource
//!                                   │
//!                                   └──────────► CacheStorage (store)
//!
//!   caller ──► IndexedLoadingCache ──► Index ──► (primary keys)
//!                  │
//!                  └──► LoadingCache (materialize values)
//!
//!   RefreshIndex ◄── IntervalRefresher (background)
//!        │
//!        └──► IndexSource (full snapshot reload)
//! ```
//!
//! Every seam is an object-safe async trait, so components compose
//! through `Arc<dyn …>` exactly as they are wired in production: the
//! same storage instance is shared by the façade (for reads) and the
//! loader (for writes after a fetch).
//!
//! ## Key bounds
//!
//! [`CacheKey`] and [`CacheValue`] are blanket-implemented marker traits
//! bundling the bounds every key and value type needs. They exist so the
//! bounds are spelled once instead of on every impl.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;

use crate::entry::{CacheEntry, Entry};
use crate::error::CacheError;

/// Bounds required of every cache key type.
///
/// Blanket-implemented; never implement this manually.
pub trait CacheKey: Eq + Hash + Clone + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + Send + Sync + 'static> CacheKey for T {}

/// Bounds required of every cache value type.
///
/// Blanket-implemented; never implement this manually.
pub trait CacheValue: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> CacheValue for T {}

/// A cache storage backend.
///
/// Implementations must be safe for concurrent invocation and must clone
/// entries on both ingress and egress: values held inside the storage
/// must never alias values held by callers.
#[async_trait]
pub trait CacheStorage<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Retrieves the entry for `key`.
    ///
    /// Returns `None` if the key is absent or its entry has expired.
    /// A fresh negative entry is returned as `Some` with
    /// [`is_negative`](CacheEntry::is_negative) set; hiding it from end
    /// callers is the façade's job, not the storage's.
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError>;

    /// Retrieves entries for `keys`, positionally aligned: position `i`
    /// of the result corresponds to `keys[i]`.
    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError>;

    /// Stores `entry`, overwriting any previous entry for its key.
    async fn set(&self, entry: &CacheEntry<K, V>) -> Result<(), CacheError>;

    /// Stores every present entry in `entries`; `None` slots are skipped.
    async fn set_multi(&self, entries: &[Option<CacheEntry<K, V>>]) -> Result<(), CacheError>;
}

/// An external source of truth for cache values.
///
/// The contract is ordered and positional: `get_multi` must return
/// exactly one slot per input key, in input order. `None` means the
/// source has no answer for the key; a negative [`CacheEntry`] means the
/// source confirmed the key does not exist (and that fact is cacheable).
#[async_trait]
pub trait LoadingSource<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Fetches the entry for `key`, or `None` on a miss.
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError>;

    /// Fetches entries for `keys`, positionally aligned to the input.
    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError>;
}

/// Loads values from a [`LoadingSource`] and stores them in a
/// [`CacheStorage`].
///
/// Implementations must be safe for concurrent invocation.
#[async_trait]
pub trait SourceLoader<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Loads the value for `key` from the source, stores it, and returns
    /// it. Misses and negative entries yield `Ok(None)`.
    async fn load_and_store(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError>;

    /// Loads values for `keys`, stores them, and returns them
    /// positionally aligned to the input.
    async fn load_and_store_multi(
        &self,
        keys: &[K],
    ) -> Result<Vec<Option<Entry<K, V>>>, CacheError>;
}

/// A secondary-key → primary-keys index.
///
/// Implementations must be safe for concurrent invocation and must
/// return copies; callers own the returned lists outright.
#[async_trait]
pub trait Index<S: CacheKey, P: CacheKey>: Send + Sync {
    /// Returns the primary keys for `key` (empty if unknown).
    async fn get(&self, key: &S) -> Result<Vec<P>, CacheError>;

    /// Returns the primary keys for each of `keys`. Keys without any
    /// primary keys are omitted from the result map.
    async fn get_multi(&self, keys: &[S]) -> Result<HashMap<S, Vec<P>>, CacheError>;
}

/// An index whose contents can be reloaded from its source.
#[async_trait]
pub trait RefreshIndex: Send + Sync {
    /// Reloads the index from its source, replacing the previous
    /// contents in their entirety.
    async fn refresh(&self) -> Result<(), CacheError>;
}

/// A source of complete index snapshots.
#[async_trait]
pub trait IndexSource<S: CacheKey, P: CacheKey>: Send + Sync {
    /// Returns the full secondary-key → primary-keys mapping.
    async fn get_all(&self) -> Result<HashMap<S, Vec<P>>, CacheError>;
}

// ---------------------------------------------------------------------------
// Arc forwarding
// ---------------------------------------------------------------------------
//
// Components are wired through `Arc<dyn …>`, so a shared handle must be
// usable wherever the trait itself is expected (e.g. composing two
// `Arc<dyn Index>` handles into a composite index).

#[async_trait]
impl<K, V, T> CacheStorage<K, V> for std::sync::Arc<T>
where
    K: CacheKey,
    V: CacheValue,
    T: CacheStorage<K, V> + ?Sized,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        (**self).get(key).await
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        (**self).get_multi(keys).await
    }

    async fn set(&self, entry: &CacheEntry<K, V>) -> Result<(), CacheError> {
        (**self).set(entry).await
    }

    async fn set_multi(&self, entries: &[Option<CacheEntry<K, V>>]) -> Result<(), CacheError> {
        (**self).set_multi(entries).await
    }
}

#[async_trait]
impl<K, V, T> LoadingSource<K, V> for std::sync::Arc<T>
where
    K: CacheKey,
    V: CacheValue,
    T: LoadingSource<K, V> + ?Sized,
{
    async fn get(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        (**self).get(key).await
    }

    async fn get_multi(&self, keys: &[K]) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        (**self).get_multi(keys).await
    }
}

#[async_trait]
impl<K, V, T> SourceLoader<K, V> for std::sync::Arc<T>
where
    K: CacheKey,
    V: CacheValue,
    T: SourceLoader<K, V> + ?Sized,
{
    async fn load_and_store(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError> {
        (**self).load_and_store(key).await
    }

    async fn load_and_store_multi(
        &self,
        keys: &[K],
    ) -> Result<Vec<Option<Entry<K, V>>>, CacheError> {
        (**self).load_and_store_multi(keys).await
    }
}

#[async_trait]
impl<S, P, T> Index<S, P> for std::sync::Arc<T>
where
    S: CacheKey,
    P: CacheKey,
    T: Index<S, P> + ?Sized,
{
    async fn get(&self, key: &S) -> Result<Vec<P>, CacheError> {
        (**self).get(key).await
    }

    async fn get_multi(&self, keys: &[S]) -> Result<HashMap<S, Vec<P>>, CacheError> {
        (**self).get_multi(keys).await
    }
}

#[async_trait]
impl<T> RefreshIndex for std::sync::Arc<T>
where
    T: RefreshIndex + ?Sized,
{
    async fn refresh(&self) -> Result<(), CacheError> {
        (**self).refresh().await
    }
}

#[async_trait]
impl<S, P, T> IndexSource<S, P> for std::sync::Arc<T>
where
    S: CacheKey,
    P: CacheKey,
    T: IndexSource<S, P> + ?Sized,
{
    async fn get_all(&self) -> Result<HashMap<S, Vec<P>>, CacheError> {
        (**self).get_all().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
