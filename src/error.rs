//! Error types for the readthrough library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: the single error enum returned by every fallible
//!   operation in the crate.
//!
//! ## Implementation Notes
//!
//! Errors produced by a shared single-flight load are delivered to every
//! waiter of that load, so `CacheError` must be cheaply cloneable. Foreign
//! errors (from user-supplied sources and storage backends) are wrapped in
//! an `Arc` to keep the enum `Clone` while preserving the error chain.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// A shared, cloneable foreign error.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by cache, loader, storage, and index operations.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The upstream loading source returned an error.
    ///
    /// A single-flight load that fails delivers the same `Source` error to
    /// every waiter sharing that load.
    #[error("source failed: {0}")]
    Source(#[source] SharedError),

    /// The cache storage backend returned an error.
    #[error("storage failed: {0}")]
    Storage(#[source] SharedError),

    /// A call into user-supplied source or storage code panicked.
    ///
    /// The panic payload is captured and delivered to all waiters instead
    /// of leaving them blocked on a load that will never complete.
    #[error("load panicked: {0}")]
    LoadPanicked(String),

    /// A background load exceeded the loader's configured deadline.
    #[error("load timed out after {0:?}")]
    LoadTimeout(Duration),

    /// A background load terminated without delivering a result.
    ///
    /// Observed when the load task is aborted (e.g. runtime shutdown)
    /// between registration and fan-out.
    #[error("load interrupted before a result was delivered")]
    LoadInterrupted,

    /// An index was torn down while a reader was waiting for its first
    /// snapshot.
    #[error("index closed before initialization")]
    IndexClosed,

    /// A source or index violated its positional-alignment contract.
    #[error("contract violation: {0}")]
    Contract(String),
}

impl CacheError {
    /// Wraps a foreign error as a [`CacheError::Source`].
    pub fn source(err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self::Source(Arc::from(err.into()))
    }

    /// Wraps a foreign error as a [`CacheError::Storage`].
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self::Storage(Arc::from(err.into()))
    }

    /// Converts a recovered panic payload into a [`CacheError::LoadPanicked`].
    pub(crate) fn from_panic(origin: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::LoadPanicked(format!("{origin}: {message}"))
    }

    /// Returns true if the error originated in the loading source.
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns true if the error originated in the storage backend.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
