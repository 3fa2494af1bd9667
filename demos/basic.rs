//! End-to-end tour: read-through caching with negative entries, plus a
//! secondary-key lookup through a refreshable index.
//!
//! Run with: `cargo run --example basic`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use readthrough::cache::LoadingCache;
use readthrough::entry::CacheEntry;
use readthrough::index::{IndexSourceFn, SnapshotIndex};
use readthrough::indexed::IndexedLoadingCache;
use readthrough::loader::SingleFlightLoader;
use readthrough::source::GetMultiSource;
use readthrough::storage::InMemoryStorage;
use readthrough::traits::{CacheStorage, Index, IndexSource, LoadingSource, RefreshIndex};

#[tokio::main]
async fn main() {
    // A pretend user database: ids 1-3 exist, everything else does not.
    let fetches = Arc::new(AtomicUsize::new(0));
    let fetches_in_source = Arc::clone(&fetches);
    let source: Arc<dyn LoadingSource<u64, String>> =
        Arc::new(GetMultiSource::new(move |ids: Vec<u64>| {
            let fetches = Arc::clone(&fetches_in_source);
            async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                println!("source: fetching {ids:?}");
                Ok(ids
                    .into_iter()
                    .map(|id| {
                        if (1..=3).contains(&id) {
                            Some(CacheEntry::new(
                                id,
                                format!("user-{id}"),
                                Instant::now() + Duration::from_secs(60),
                            ))
                        } else {
                            // Confirmed non-existence, cached for 10s.
                            Some(CacheEntry::negative(
                                id,
                                Instant::now() + Duration::from_secs(10),
                            ))
                        }
                    })
                    .collect())
            }
        }));

    let storage = Arc::new(InMemoryStorage::<u64, String>::new());
    let loader = Arc::new(SingleFlightLoader::new(
        Arc::clone(&storage) as Arc<dyn CacheStorage<u64, String>>,
        source,
    ));
    let cache = LoadingCache::new(storage, loader);

    // First lookup loads from the source; the second is a cache hit.
    let user = cache.get_or_load(&1).await.unwrap().unwrap();
    println!("loaded: {} = {}", user.key, user.value);
    let user = cache.get_or_load(&1).await.unwrap().unwrap();
    println!("cached: {} = {}", user.key, user.value);

    // Unknown ids are negative-cached: one fetch, then silence.
    assert!(cache.get_or_load(&99).await.unwrap().is_none());
    assert!(cache.get_or_load(&99).await.unwrap().is_none());
    println!("source fetches so far: {}", fetches.load(Ordering::SeqCst));

    // A team index resolves team names to member ids.
    let index = Arc::new(SnapshotIndex::new(Arc::new(IndexSourceFn::new(|| async {
        let mut teams = HashMap::new();
        teams.insert("platform".to_string(), vec![1_u64, 2]);
        teams.insert("search".to_string(), vec![2, 3]);
        Ok(teams)
    })) as Arc<dyn IndexSource<String, u64>>));
    index.refresh().await.unwrap();

    let by_team = IndexedLoadingCache::new(cache, Arc::clone(&index) as Arc<dyn Index<String, u64>>);
    let members = by_team
        .find_by_secondary_key(&"platform".to_string())
        .await
        .unwrap();
    for member in members {
        println!("platform member: {}", member.value);
    }
}
