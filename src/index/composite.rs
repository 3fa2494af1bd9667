//! Union and intersection combinators over two indexes.
//!
//! Both combinators compose two indexes with potentially different
//! secondary-key types over a shared primary-key type, addressed by
//! [`CompositeKey`]. Set operations run in expected linear time via a
//! hash set of one side.
//!
//! ## Resolution rules
//!
//! With only one side of the key present, that side's index is queried
//! alone. [`UnionIndex`] returns its result unchanged. For
//! [`IntersectionIndex`] a present-but-unqueried other side would make
//! the intersection empty, so a one-sided result is returned only when
//! the other side is truly absent from the key.
//!
//! With both sides present, [`UnionIndex`] returns each primary key at
//! most once (right-side order first, then unseen left-side keys), and
//! [`IntersectionIndex`] returns the keys present in both results.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use rustc_hash::FxHashSet;

use crate::error::CacheError;
use crate::index::keys::CompositeKey;
use crate::traits::{CacheKey, Index};

/// Logical OR over two indexes: the union of both sides' primary keys.
#[derive(Debug)]
pub struct UnionIndex<IL, IR> {
    left: IL,
    right: IR,
}

impl<IL, IR> UnionIndex<IL, IR> {
    /// Creates a union over the two indexes.
    pub fn new(left: IL, right: IR) -> Self {
        Self { left, right }
    }
}

/// Logical AND over two indexes: the intersection of both sides'
/// primary keys.
#[derive(Debug)]
pub struct IntersectionIndex<IL, IR> {
    left: IL,
    right: IR,
}

impl<IL, IR> IntersectionIndex<IL, IR> {
    /// Creates an intersection over the two indexes.
    pub fn new(left: IL, right: IR) -> Self {
        Self { left, right }
    }
}

/// Each value of `first` then each unseen value of `second`, every value
/// at most once.
fn union_of<P: Eq + Hash + Clone>(first: Vec<P>, second: Vec<P>) -> Vec<P> {
    let mut seen = FxHashSet::with_capacity_and_hasher(first.len() + second.len(), Default::default());
    let mut result = Vec::new();
    for value in first.into_iter().chain(second) {
        if seen.insert(value.clone()) {
            result.push(value);
        }
    }
    result
}

/// Values present in both lists, in `right` order, each at most once.
fn intersection_of<P: Eq + Hash + Clone>(left: &[P], right: Vec<P>) -> Vec<P> {
    let left_set: FxHashSet<&P> = left.iter().collect();
    let mut emitted = FxHashSet::with_capacity_and_hasher(left.len().min(right.len()), Default::default());
    let mut result = Vec::new();
    for value in right {
        if left_set.contains(&value) && emitted.insert(value.clone()) {
            result.push(value);
        }
    }
    result
}

/// Queries the per-side indexes of a composite key, returning an empty
/// list for an absent side.
async fn query_sides<L, R, P, IL, IR>(
    left_index: &IL,
    right_index: &IR,
    key: &CompositeKey<L, R>,
) -> Result<(Vec<P>, Vec<P>), CacheError>
where
    L: CacheKey,
    R: CacheKey,
    P: CacheKey,
    IL: Index<L, P>,
    IR: Index<R, P>,
{
    let left_pks = match &key.left {
        Some(left) => left_index.get(left).await?,
        None => Vec::new(),
    };
    let right_pks = match &key.right {
        Some(right) => right_index.get(right).await?,
        None => Vec::new(),
    };
    Ok((left_pks, right_pks))
}

/// Projects the distinct left-side and right-side secondary keys out of
/// a batch of composite keys, preserving first-occurrence order.
fn project_sides<L: CacheKey, R: CacheKey>(keys: &[CompositeKey<L, R>]) -> (Vec<L>, Vec<R>) {
    let mut left_seen = FxHashSet::default();
    let mut left_keys = Vec::new();
    let mut right_seen = FxHashSet::default();
    let mut right_keys = Vec::new();
    for key in keys {
        if let Some(left) = &key.left {
            if left_seen.insert(left.clone()) {
                left_keys.push(left.clone());
            }
        }
        if let Some(right) = &key.right {
            if right_seen.insert(right.clone()) {
                right_keys.push(right.clone());
            }
        }
    }
    (left_keys, right_keys)
}

/// Runs one batched query per side over the projected key sets.
async fn query_sides_multi<L, R, P, IL, IR>(
    left_index: &IL,
    right_index: &IR,
    keys: &[CompositeKey<L, R>],
) -> Result<(HashMap<L, Vec<P>>, HashMap<R, Vec<P>>), CacheError>
where
    L: CacheKey,
    R: CacheKey,
    P: CacheKey,
    IL: Index<L, P>,
    IR: Index<R, P>,
{
    let (left_keys, right_keys) = project_sides(keys);
    let left_map = if left_keys.is_empty() {
        HashMap::new()
    } else {
        left_index.get_multi(&left_keys).await?
    };
    let right_map = if right_keys.is_empty() {
        HashMap::new()
    } else {
        right_index.get_multi(&right_keys).await?
    };
    Ok((left_map, right_map))
}

/// Looks up one composite key's per-side results in the batched maps.
fn side_results<'a, L, R, P>(
    key: &CompositeKey<L, R>,
    left_map: &'a HashMap<L, Vec<P>>,
    right_map: &'a HashMap<R, Vec<P>>,
) -> (&'a [P], &'a [P])
where
    L: CacheKey,
    R: CacheKey,
{
    let left = key
        .left
        .as_ref()
        .and_then(|l| left_map.get(l))
        .map(Vec::as_slice)
        .unwrap_or_default();
    let right = key
        .right
        .as_ref()
        .and_then(|r| right_map.get(r))
        .map(Vec::as_slice)
        .unwrap_or_default();
    (left, right)
}

#[async_trait]
impl<L, R, P, IL, IR> Index<CompositeKey<L, R>, P> for UnionIndex<IL, IR>
where
    L: CacheKey,
    R: CacheKey,
    P: CacheKey,
    IL: Index<L, P>,
    IR: Index<R, P>,
{
    async fn get(&self, key: &CompositeKey<L, R>) -> Result<Vec<P>, CacheError> {
        let (left_pks, right_pks) = query_sides(&self.left, &self.right, key).await?;
        Ok(match (left_pks.is_empty(), right_pks.is_empty()) {
            (true, true) => Vec::new(),
            (false, true) => left_pks,
            (true, false) => right_pks,
            (false, false) => union_of(right_pks, left_pks),
        })
    }

    async fn get_multi(
        &self,
        keys: &[CompositeKey<L, R>],
    ) -> Result<HashMap<CompositeKey<L, R>, Vec<P>>, CacheError> {
        let (left_map, right_map) = query_sides_multi(&self.left, &self.right, keys).await?;

        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            let (left, right) = side_results(key, &left_map, &right_map);
            let combined = match (left.is_empty(), right.is_empty()) {
                (true, true) => continue,
                (false, true) => left.to_vec(),
                (true, false) => right.to_vec(),
                (false, false) => union_of(right.to_vec(), left.to_vec()),
            };
            result.insert(key.clone(), combined);
        }
        Ok(result)
    }
}

#[async_trait]
impl<L, R, P, IL, IR> Index<CompositeKey<L, R>, P> for IntersectionIndex<IL, IR>
where
    L: CacheKey,
    R: CacheKey,
    P: CacheKey,
    IL: Index<L, P>,
    IR: Index<R, P>,
{
    async fn get(&self, key: &CompositeKey<L, R>) -> Result<Vec<P>, CacheError> {
        let (left_pks, right_pks) = query_sides(&self.left, &self.right, key).await?;
        Ok(match (left_pks.is_empty(), right_pks.is_empty()) {
            (true, true) => Vec::new(),
            // One side answered and the other side was never asked:
            // only a truly absent other side keeps the result.
            (false, true) if key.right.is_none() => left_pks,
            (true, false) if key.left.is_none() => right_pks,
            (false, false) => intersection_of(&left_pks, right_pks),
            _ => Vec::new(),
        })
    }

    async fn get_multi(
        &self,
        keys: &[CompositeKey<L, R>],
    ) -> Result<HashMap<CompositeKey<L, R>, Vec<P>>, CacheError> {
        let (left_map, right_map) = query_sides_multi(&self.left, &self.right, keys).await?;

        let mut result = HashMap::new();
        for key in keys {
            let (left, right) = side_results(key, &left_map, &right_map);
            let combined = match (left.is_empty(), right.is_empty()) {
                (false, true) if key.right.is_none() => left.to_vec(),
                (true, false) if key.left.is_none() => right.to_vec(),
                (false, false) => intersection_of(left, right.to_vec()),
                _ => continue,
            };
            if combined.is_empty() {
                continue;
            }
            result.insert(key.clone(), combined);
        }
        Ok(result)
    }
}

// =============================================================================
// Tests
// =============================================================================
