//! Refreshable on-memory index.
//!
//! ## Architecture
//!
//! ```text
//!                refresh()                       readers
//!                    │                              │
//!    source.get_all()│                              │ wait for first
//!                    ▼                              ▼ snapshot, then read
//!            ┌───────────────┐   send_replace  ┌─────────────────────┐
//!            │ new snapshot  ├────────────────►│ watch channel       │
//!            │ Arc<HashMap>  │   (atomic swap  │ Option<Arc<HashMap>>│
//!            └───────────────┘    + broadcast) └─────────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Atomic snapshot replacement**: `refresh` loads a complete
//!   secondary-key → primary-keys mapping from the [`IndexSource`] and
//!   publishes it with one `watch::Sender::send_replace`. A reader
//!   observes either the old snapshot or the new one in its entirety,
//!   never a mix.
//! - **First-read wait**: until the first successful refresh the
//!   published state is `None` and readers wait on the watch channel.
//!   The wait is woken by the first snapshot and is cancellable by
//!   dropping the reader's future (e.g. under `tokio::time::timeout`).
//!   After the first refresh, readers never wait again.
//! - **Copies out**: readers receive freshly cloned key lists; internal
//!   snapshot state is never mutated, only replaced, and never escapes.
//! - **Fault containment**: a panicking index source is caught and
//!   surfaced as an error from `refresh` without touching the published
//!   snapshot.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;

use crate::error::CacheError;
use crate::traits::{CacheKey, Index, IndexSource, RefreshIndex};

type Snapshot<S, P> = Arc<HashMap<S, Vec<P>>>;

/// A refreshable secondary-key → primary-keys index held entirely in
/// memory.
///
/// # Example
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use readthrough::index::{IndexSourceFn, SnapshotIndex};
/// use readthrough::traits::{Index, RefreshIndex};
///
/// let source = Arc::new(IndexSourceFn::new(|| async {
///     let mut m = HashMap::new();
///     m.insert("cat".to_string(), vec![1_u64, 2]);
///     Ok(m)
/// }));
/// let index = SnapshotIndex::new(source);
///
/// index.refresh().await.unwrap();
/// assert_eq!(index.get(&"cat".to_string()).await.unwrap(), vec![1, 2]);
/// # }
/// ```
pub struct SnapshotIndex<S, P> {
    source: Arc<dyn IndexSource<S, P>>,
    state: watch::Sender<Option<Snapshot<S, P>>>,
}

impl<S, P> std::fmt::Debug for SnapshotIndex<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let initialized = self.state.borrow().is_some();
        f.debug_struct("SnapshotIndex")
            .field("initialized", &initialized)
            .finish_non_exhaustive()
    }
}

impl<S, P> SnapshotIndex<S, P>
where
    S: CacheKey,
    P: CacheKey,
{
    /// Creates an uninitialized index over `source`.
    ///
    /// Readers block until the first successful
    /// [`refresh`](RefreshIndex::refresh).
    pub fn new(source: Arc<dyn IndexSource<S, P>>) -> Self {
        let (state, _) = watch::channel(None);
        Self { source, state }
    }

    /// Returns true once a snapshot has been published.
    pub fn is_initialized(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Returns the current snapshot, waiting for the first refresh if
    /// none has been published yet.
    async fn snapshot(&self) -> Result<Snapshot<S, P>, CacheError> {
        if let Some(snapshot) = self.state.borrow().as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let mut receiver = self.state.subscribe();
        let published = receiver
            .wait_for(|state| state.is_some())
            .await
            .map_err(|_closed| CacheError::IndexClosed)?;
        published
            .as_ref()
            .map(Arc::clone)
            .ok_or(CacheError::IndexClosed)
    }
}

#[async_trait]
impl<S, P> RefreshIndex for SnapshotIndex<S, P>
where
    S: CacheKey,
    P: CacheKey,
{
    async fn refresh(&self) -> Result<(), CacheError> {
        let loaded = AssertUnwindSafe(self.source.get_all()).catch_unwind().await;
        match loaded {
            Ok(Ok(mapping)) => {
                self.state.send_replace(Some(Arc::new(mapping)));
                Ok(())
            },
            Ok(Err(err)) => Err(err),
            Err(payload) => Err(CacheError::from_panic("index source", payload)),
        }
    }
}

#[async_trait]
impl<S, P> Index<S, P> for SnapshotIndex<S, P>
where
    S: CacheKey,
    P: CacheKey,
{
    async fn get(&self, key: &S) -> Result<Vec<P>, CacheError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.get(key).cloned().unwrap_or_default())
    }

    async fn get_multi(&self, keys: &[S]) -> Result<HashMap<S, Vec<P>>, CacheError> {
        let snapshot = self.snapshot().await?;
        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(pks) = snapshot.get(key) {
                result.insert(key.clone(), pks.clone());
            }
        }
        Ok(result)
    }
}

// =============================================================================
// Tests
// =============================================================================
