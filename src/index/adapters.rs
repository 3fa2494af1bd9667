//! Closure-backed index and index-source adapters.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::CacheError;
use crate::traits::{CacheKey, Index, IndexSource};

type GetFn<S, P> = Box<dyn Fn(S) -> BoxFuture<'static, Result<Vec<P>, CacheError>> + Send + Sync>;
type GetMultiFn<S, P> = Box<
    dyn Fn(Vec<S>) -> BoxFuture<'static, Result<HashMap<S, Vec<P>>, CacheError>> + Send + Sync,
>;

/// An [`Index`] backed by two user closures.
pub struct FunctionsIndex<S, P> {
    get_fn: GetFn<S, P>,
    get_multi_fn: GetMultiFn<S, P>,
}

impl<S, P> FunctionsIndex<S, P>
where
    S: CacheKey,
    P: CacheKey,
{
    /// Creates an index from a single-key closure and a batched closure.
    pub fn new<G, GFut, GM, GMFut>(get: G, get_multi: GM) -> Self
    where
        G: Fn(S) -> GFut + Send + Sync + 'static,
        GFut: Future<Output = Result<Vec<P>, CacheError>> + Send + 'static,
        GM: Fn(Vec<S>) -> GMFut + Send + Sync + 'static,
        GMFut: Future<Output = Result<HashMap<S, Vec<P>>, CacheError>> + Send + 'static,
    {
        Self {
            get_fn: Box::new(move |key| get(key).boxed()),
            get_multi_fn: Box::new(move |keys| get_multi(keys).boxed()),
        }
    }
}

#[async_trait]
impl<S, P> Index<S, P> for FunctionsIndex<S, P>
where
    S: CacheKey,
    P: CacheKey,
{
    async fn get(&self, key: &S) -> Result<Vec<P>, CacheError> {
        (self.get_fn)(key.clone()).await
    }

    async fn get_multi(&self, keys: &[S]) -> Result<HashMap<S, Vec<P>>, CacheError> {
        (self.get_multi_fn)(keys.to_vec()).await
    }
}

/// An [`IndexSource`] backed by one closure returning the full snapshot.
pub struct IndexSourceFn<F> {
    get_all_fn: F,
}

impl<F> IndexSourceFn<F> {
    /// Creates an index source from the snapshot closure.
    pub fn new(get_all_fn: F) -> Self {
        Self { get_all_fn }
    }
}

#[async_trait]
impl<S, P, F, Fut> IndexSource<S, P> for IndexSourceFn<F>
where
    S: CacheKey,
    P: CacheKey,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<HashMap<S, Vec<P>>, CacheError>> + Send,
{
    async fn get_all(&self) -> Result<HashMap<S, Vec<P>>, CacheError> {
        (self.get_all_fn)().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
