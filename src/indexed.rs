//! Indexed loading cache: secondary-key lookups over a loading cache.
//!
//! [`IndexedLoadingCache`] resolves secondary keys to primary keys
//! through an [`Index`], then materializes values through the wrapped
//! [`LoadingCache`]. A batched lookup loads each distinct primary key
//! exactly once, even when several secondary keys reference it; the
//! first referencing secondary key receives the loaded entry itself and
//! every additional one receives a copy made by the configured
//! [`ValueCloner`].

use std::collections::HashMap;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cache::LoadingCache;
use crate::cloner::{CloneCloner, ValueCloner};
use crate::entry::Entry;
use crate::error::CacheError;
use crate::traits::{CacheKey, CacheValue, Index};

/// A [`LoadingCache`] augmented with a secondary-key index.
pub struct IndexedLoadingCache<P, S, V> {
    cache: LoadingCache<P, V>,
    index: Arc<dyn Index<S, P>>,
    cloner: Arc<dyn ValueCloner<V>>,
}

impl<P, S, V> std::fmt::Debug for IndexedLoadingCache<P, S, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedLoadingCache").finish_non_exhaustive()
    }
}

impl<P, S, V> IndexedLoadingCache<P, S, V>
where
    P: CacheKey,
    S: CacheKey,
    V: CacheValue,
{
    /// Creates an indexed cache with the default `Clone`-based value
    /// cloner.
    pub fn new(cache: LoadingCache<P, V>, index: Arc<dyn Index<S, P>>) -> Self
    where
        V: Clone,
    {
        Self {
            cache,
            index,
            cloner: Arc::new(CloneCloner),
        }
    }

    /// Creates an indexed cache with a custom value cloner for shared
    /// results.
    pub fn with_cloner(
        cache: LoadingCache<P, V>,
        index: Arc<dyn Index<S, P>>,
        cloner: impl ValueCloner<V> + 'static,
    ) -> Self {
        Self {
            cache,
            index,
            cloner: Arc::new(cloner),
        }
    }

    /// Returns the wrapped primary-key cache.
    pub fn cache(&self) -> &LoadingCache<P, V> {
        &self.cache
    }

    /// Retrieves the value for a primary key directly, bypassing the
    /// index.
    pub async fn get_or_load(&self, key: &P) -> Result<Option<Entry<P, V>>, CacheError> {
        self.cache.get_or_load(key).await
    }

    /// Retrieves the entries referenced by one secondary key.
    ///
    /// Primary keys the upstream no longer knows are dropped from the
    /// result, so the list may be shorter than the index mapping.
    pub async fn find_by_secondary_key(&self, key: &S) -> Result<Vec<Entry<P, V>>, CacheError> {
        let primary_keys = self.index.get(key).await?;
        if primary_keys.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.cache.get_or_load_multi(&primary_keys).await?;
        Ok(entries.into_iter().flatten().collect())
    }

    /// Retrieves the entries referenced by each of several secondary
    /// keys.
    ///
    /// Each distinct primary key is loaded once. A value referenced by
    /// several secondary keys appears in each one's list: the first
    /// reference holds the loaded value, later references hold clones.
    /// Secondary keys resolving to no entries are omitted from the
    /// result map.
    pub async fn find_by_secondary_keys(
        &self,
        keys: &[S],
    ) -> Result<HashMap<S, Vec<Entry<P, V>>>, CacheError> {
        let resolved = self.index.get_multi(keys).await?;
        if resolved.is_empty() {
            return Ok(HashMap::new());
        }

        // Distinct primary keys in first-reference order, remembering
        // which secondary keys reference each.
        let mut distinct: Vec<P> = Vec::new();
        let mut referrers: FxHashMap<P, Vec<S>> = FxHashMap::default();
        let mut seen_keys: FxHashSet<&S> = FxHashSet::default();
        for key in keys {
            if !seen_keys.insert(key) {
                continue;
            }
            let Some(primary_keys) = resolved.get(key) else {
                continue;
            };
            for primary_key in primary_keys {
                let refs = referrers.entry(primary_key.clone()).or_default();
                if refs.is_empty() {
                    distinct.push(primary_key.clone());
                }
                refs.push(key.clone());
            }
        }

        let loaded = self.cache.get_or_load_multi(&distinct).await?;

        let mut result: HashMap<S, Vec<Entry<P, V>>> = HashMap::with_capacity(resolved.len());
        for entry in loaded.into_iter().flatten() {
            let Some(refs) = referrers.get(&entry.key) else {
                continue;
            };
            for secondary in refs.iter().skip(1) {
                let copy = Entry {
                    key: entry.key.clone(),
                    value: self.cloner.clone_value(&entry.value),
                };
                result.entry(secondary.clone()).or_default().push(copy);
            }
            if let Some(first) = refs.first() {
                result.entry(first.clone()).or_default().push(entry);
            }
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
