//! Cache entry types.
//!
//! ## Key Components
//!
//! - [`Entry`]: a plain key-value pair, the unit handed back to callers.
//! - [`CacheEntry`]: an [`Entry`] with an expiration instant and an
//!   optional negative-cache marker, the unit exchanged with sources and
//!   storage backends.
//!
//! ## Negative caching
//!
//! A negative entry records that the upstream source confirmed the key
//! does not exist. It carries no value (there is nothing to carry) and is
//! subject to expiration like any other entry. While a fresh negative
//! entry is present in storage, lookups resolve to "absent" without
//! touching the source.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::{Duration, Instant};
//! use readthrough::entry::CacheEntry;
//!
//! let expires_at = Instant::now() + Duration::from_secs(60);
//! let hit = CacheEntry::new(42_u64, "value".to_string(), expires_at);
//! assert_eq!(hit.value(), Some(&"value".to_string()));
//!
//! let miss = CacheEntry::<u64, String>::negative(7, expires_at);
//! assert!(miss.is_negative());
//! assert_eq!(miss.value(), None);
//! ```

use std::time::Instant;

use crate::cloner::ValueCloner;

/// A key-value pair returned to cache callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<K, V> {
    /// The key of the entry.
    pub key: K,
    /// The value associated with the key.
    pub value: V,
}

impl<K, V> Entry<K, V> {
    /// Creates a new entry.
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}

/// A cache entry as exchanged with sources and storage backends.
///
/// Every entry carries a concrete expiration instant; there is no
/// "unset" expiration. Negative entries structurally have no value, so
/// the invariant "a negative entry carries no payload" cannot be
/// violated by construction.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    key: K,
    value: Option<V>,
    expires_at: Instant,
}

impl<K, V> CacheEntry<K, V> {
    /// Creates a positive entry holding `value` until `expires_at`.
    pub fn new(key: K, value: V, expires_at: Instant) -> Self {
        Self {
            key,
            value: Some(value),
            expires_at,
        }
    }

    /// Creates a negative entry: the source confirmed `key` does not
    /// exist. The entry expires at `expires_at` like any other.
    pub fn negative(key: K, expires_at: Instant) -> Self {
        Self {
            key,
            value: None,
            expires_at,
        }
    }

    /// Returns the entry's key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the entry's value, or `None` for a negative entry.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Returns the instant at which this entry expires.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns true if this is a negative-cache entry.
    pub fn is_negative(&self) -> bool {
        self.value.is_none()
    }

    /// Consumes the cache entry, yielding the caller-facing [`Entry`].
    ///
    /// Returns `None` for negative entries.
    pub fn into_entry(self) -> Option<Entry<K, V>> {
        let key = self.key;
        self.value.map(|value| Entry { key, value })
    }
}

impl<K: Clone, V> CacheEntry<K, V> {
    /// Produces a copy of this entry with the value duplicated through
    /// `cloner`.
    ///
    /// Negative entries skip the cloner entirely: the marker and the
    /// expiration are preserved, no value is materialized. Storage
    /// implementations use this on both ingress and egress so that stored
    /// values never alias caller-held ones.
    pub fn clone_via(&self, cloner: &dyn ValueCloner<V>) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.as_ref().map(|v| cloner.clone_value(v)),
            expires_at: self.expires_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
