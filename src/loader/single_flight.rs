//! Single-flight source loader.
//!
//! ## Architecture
//!
//! ```text
//!  caller A ──┐  register(key)                 ┌────────────────────┐
//!  caller B ──┼────────────────────────────────►  waitlists[key]    │
//!  caller C ──┘  (each gets a oneshot::Receiver)  [tx_A, tx_B, tx_C]│
//!                                              └─────────┬──────────┘
//!                   first registration spawns            │
//!                   ONE detached load task               ▼
//!                       source.get(key) ──► storage.set(entry)
//!                                                        │
//!                  fan-out: tx_A ◄─ entry (moved)        │
//!                           tx_B ◄─ clone ───────────────┘
//!                           tx_C ◄─ clone
//! ```
//!
//! ## Key Concepts
//!
//! - **Coalescing**: concurrent loads for the same key (including
//!   occurrences inside batched loads) share one source fetch. The
//!   first waiter to register a key triggers the fetch; later waiters
//!   only append a channel.
//! - **Detached execution**: the fetch runs on its own spawned task, not
//!   inside any caller's future. A caller that stops waiting (timeout,
//!   `select!`, drop) abandons only its own receiver; the fetch and the
//!   other waiters are unaffected, and the one-shot channel means the
//!   producer never blocks on an abandoned receiver.
//! - **Fan-out cloning**: the first waiter receives the loaded value by
//!   move; every additional waiter receives a copy made by the
//!   configured [`ValueCloner`]. The common single-waiter case pays no
//!   clone; the many-waiter case cannot alias.
//! - **Fault containment**: panics inside the source or storage are
//!   caught and delivered to all waiters as an error. A load task that
//!   dies without delivering (runtime shutdown) surfaces as
//!   [`CacheError::LoadInterrupted`].
//! - **Negative entries** are persisted to storage but delivered to
//!   waiters as `None`; callers cannot distinguish a confirmed miss from
//!   a plain miss, by design.
//!
//! ## Example Usage
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//! use readthrough::entry::CacheEntry;
//! use readthrough::loader::SingleFlightLoader;
//! use readthrough::source::GetMultiSource;
//! use readthrough::storage::InMemoryStorage;
//! use readthrough::traits::SourceLoader;
//!
//! let storage = Arc::new(InMemoryStorage::<u64, String>::new());
//! let source = Arc::new(GetMultiSource::new(|keys: Vec<u64>| async move {
//!     Ok(keys
//!         .into_iter()
//!         .map(|k| {
//!             Some(CacheEntry::new(
//!                 k,
//!                 format!("value-{k}"),
//!                 Instant::now() + Duration::from_secs(60),
//!             ))
//!         })
//!         .collect())
//! }));
//!
//! let loader = SingleFlightLoader::new(storage, source);
//! let entry = loader.load_and_store(&1).await.unwrap().unwrap();
//! assert_eq!(entry.value, "value-1");
//! # }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::cloner::{CloneCloner, ValueCloner};
use crate::entry::{CacheEntry, Entry};
use crate::error::CacheError;
use crate::traits::{CacheKey, CacheStorage, CacheValue, LoadingSource, SourceLoader};

type LoadResult<K, V> = Result<Option<Entry<K, V>>, CacheError>;
type Waitlists<K, V> = Mutex<FxHashMap<K, Vec<oneshot::Sender<LoadResult<K, V>>>>>;

/// A [`SourceLoader`] that coalesces concurrent loads per key.
///
/// Cheap to clone; clones share the same waitlists, source, and storage.
pub struct SingleFlightLoader<K, V> {
    inner: Arc<LoaderInner<K, V>>,
}

impl<K, V> Clone for SingleFlightLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> std::fmt::Debug for SingleFlightLoader<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.inner.waitlists.lock().len();
        f.debug_struct("SingleFlightLoader")
            .field("pending_keys", &pending)
            .finish_non_exhaustive()
    }
}

struct LoaderInner<K, V> {
    storage: Arc<dyn CacheStorage<K, V>>,
    source: Arc<dyn LoadingSource<K, V>>,
    cloner: Arc<dyn ValueCloner<V>>,
    load_timeout: Option<Duration>,
    waitlists: Waitlists<K, V>,
}

impl<K, V> SingleFlightLoader<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Creates a loader with the default `Clone`-based value cloner and
    /// no load deadline.
    pub fn new(
        storage: Arc<dyn CacheStorage<K, V>>,
        source: Arc<dyn LoadingSource<K, V>>,
    ) -> Self
    where
        V: Clone,
    {
        Self::builder(storage, source).build()
    }

    /// Returns a builder for configuring the cloner and load deadline.
    pub fn builder(
        storage: Arc<dyn CacheStorage<K, V>>,
        source: Arc<dyn LoadingSource<K, V>>,
    ) -> SingleFlightLoaderBuilder<K, V> {
        SingleFlightLoaderBuilder {
            storage,
            source,
            cloner: None,
            load_timeout: None,
        }
    }

    /// Registers a waiter for `key`, spawning the load task if this is
    /// the first waiter in the current single-flight window.
    fn register(&self, key: &K) -> oneshot::Receiver<LoadResult<K, V>> {
        let (tx, rx) = oneshot::channel();
        let spawn_load = {
            let mut waitlists = self.inner.waitlists.lock();
            let waiters = waitlists.entry(key.clone()).or_default();
            waiters.push(tx);
            waiters.len() == 1
        };
        if spawn_load {
            let inner = Arc::clone(&self.inner);
            let key = key.clone();
            tokio::spawn(async move {
                let result = inner.fetch_and_store_one(&key).await;
                inner.deliver(&key, result);
            });
        }
        rx
    }

    /// Registers waiters for every key, spawning one load task covering
    /// all keys that were first-seen in this registration.
    fn register_multi(&self, keys: &[K]) -> Vec<oneshot::Receiver<LoadResult<K, V>>> {
        let mut receivers = Vec::with_capacity(keys.len());
        let mut first_seen = Vec::new();
        {
            let mut waitlists = self.inner.waitlists.lock();
            for key in keys {
                let (tx, rx) = oneshot::channel();
                let waiters = waitlists.entry(key.clone()).or_default();
                waiters.push(tx);
                if waiters.len() == 1 {
                    first_seen.push(key.clone());
                }
                receivers.push(rx);
            }
        }
        if !first_seen.is_empty() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.fetch_store_and_deliver_multi(first_seen).await;
            });
        }
        receivers
    }
}

impl<K, V> LoaderInner<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Runs a panic-intercepted future, applying the configured load
    /// deadline if any.
    async fn run_guarded<T>(
        &self,
        origin: &str,
        fut: impl std::future::Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        let guarded = AssertUnwindSafe(fut).catch_unwind();
        let outcome = match self.load_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, guarded).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => return Err(CacheError::LoadTimeout(deadline)),
            },
            None => guarded.await,
        };
        match outcome {
            Ok(result) => result,
            Err(payload) => Err(CacheError::from_panic(origin, payload)),
        }
    }

    async fn fetch_and_store_one(&self, key: &K) -> Result<Option<CacheEntry<K, V>>, CacheError> {
        let fetched = self.run_guarded("source", self.source.get(key)).await?;
        if let Some(entry) = &fetched {
            // Storage writes are guarded too: a panicking backend must
            // not strand the waiters.
            match AssertUnwindSafe(self.storage.set(entry)).catch_unwind().await {
                Ok(result) => result?,
                Err(payload) => return Err(CacheError::from_panic("storage", payload)),
            }
        }
        Ok(fetched)
    }

    async fn fetch_store_and_deliver_multi(&self, keys: Vec<K>) {
        match self.fetch_and_store_multi(&keys).await {
            Ok(entries) => {
                for (key, entry) in keys.iter().zip(entries) {
                    self.deliver(key, Ok(entry));
                }
            },
            Err(err) => {
                for key in &keys {
                    self.deliver(key, Err(err.clone()));
                }
            },
        }
    }

    async fn fetch_and_store_multi(
        &self,
        keys: &[K],
    ) -> Result<Vec<Option<CacheEntry<K, V>>>, CacheError> {
        let entries = self
            .run_guarded("source", self.source.get_multi(keys))
            .await?;
        if entries.len() != keys.len() {
            return Err(CacheError::Contract(format!(
                "source returned {} entries for {} keys",
                entries.len(),
                keys.len(),
            )));
        }
        // The whole positional result is stored, missing slots included;
        // the storage skips absent slots itself.
        match AssertUnwindSafe(self.storage.set_multi(&entries)).catch_unwind().await {
            Ok(result) => result?,
            Err(payload) => return Err(CacheError::from_panic("storage", payload)),
        }
        Ok(entries)
    }

    /// Delivers the outcome of a load to every waiter registered for
    /// `key`, then resets the waitlist for the next flight.
    fn deliver(&self, key: &K, result: Result<Option<CacheEntry<K, V>>, CacheError>) {
        let waiters: Vec<oneshot::Sender<LoadResult<K, V>>> = {
            let mut waitlists = self.waitlists.lock();
            match waitlists.get_mut(key) {
                // drain() keeps the allocation for the next flight.
                Some(waiters) => waiters.drain(..).collect(),
                None => return,
            }
        };

        if let Err(err) = &result {
            tracing::warn!(error = %err, waiters = waiters.len(), "load failed");
        }

        match result {
            Err(err) => {
                for tx in waiters {
                    let _ = tx.send(Err(err.clone()));
                }
            },
            Ok(loaded) => {
                // Negative entries were stored above, but callers see a miss.
                match loaded.filter(|entry| !entry.is_negative()).and_then(CacheEntry::into_entry) {
                    None => {
                        for tx in waiters {
                            let _ = tx.send(Ok(None));
                        }
                    },
                    Some(entry) => {
                        let mut waiters = waiters.into_iter();
                        let first = waiters.next();
                        for tx in waiters {
                            let copy = Entry {
                                key: entry.key.clone(),
                                value: self.cloner.clone_value(&entry.value),
                            };
                            let _ = tx.send(Ok(Some(copy)));
                        }
                        if let Some(tx) = first {
                            // The first waiter gets the loaded value itself;
                            // the single-waiter case never pays a clone.
                            let _ = tx.send(Ok(Some(entry)));
                        }
                    },
                }
            },
        }
    }
}

#[async_trait]
impl<K, V> SourceLoader<K, V> for SingleFlightLoader<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    async fn load_and_store(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError> {
        let rx = self.register(key);
        match rx.await {
            Ok(result) => result,
            Err(_closed) => Err(CacheError::LoadInterrupted),
        }
    }

    async fn load_and_store_multi(
        &self,
        keys: &[K],
    ) -> Result<Vec<Option<Entry<K, V>>>, CacheError> {
        let receivers = self.register_multi(keys);
        let mut entries = Vec::with_capacity(receivers.len());
        for rx in receivers {
            match rx.await {
                Ok(Ok(entry)) => entries.push(entry),
                // The first error aborts the batch; the remaining
                // receivers are simply dropped, which never blocks the
                // producer side of a one-shot channel.
                Ok(Err(err)) => return Err(err),
                Err(_closed) => return Err(CacheError::LoadInterrupted),
            }
        }
        Ok(entries)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SingleFlightLoader`].
pub struct SingleFlightLoaderBuilder<K, V> {
    storage: Arc<dyn CacheStorage<K, V>>,
    source: Arc<dyn LoadingSource<K, V>>,
    cloner: Option<Arc<dyn ValueCloner<V>>>,
    load_timeout: Option<Duration>,
}

impl<K, V> SingleFlightLoaderBuilder<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Overrides the cloner used for fan-out to additional waiters.
    pub fn cloner(mut self, cloner: impl ValueCloner<V> + 'static) -> Self {
        self.cloner = Some(Arc::new(cloner));
        self
    }

    /// Applies a deadline to every background source fetch.
    ///
    /// A fetch exceeding the deadline fails all waiters of that flight
    /// with [`CacheError::LoadTimeout`]. Deadlines belong here rather
    /// than on callers: a caller-side timeout only abandons that
    /// caller's wait and must not cancel a fetch other callers share.
    pub fn load_timeout(mut self, deadline: Duration) -> Self {
        self.load_timeout = Some(deadline);
        self
    }

    /// Builds the loader.
    pub fn build(self) -> SingleFlightLoader<K, V>
    where
        V: Clone,
    {
        let cloner = self.cloner.unwrap_or_else(|| Arc::new(CloneCloner));
        SingleFlightLoader {
            inner: Arc::new(LoaderInner {
                storage: self.storage,
                source: self.source,
                cloner,
                load_timeout: self.load_timeout,
                waitlists: Mutex::new(FxHashMap::default()),
            }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
