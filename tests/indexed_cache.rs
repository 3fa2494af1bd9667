// ==============================================
// INDEXED CACHE END-TO-END TESTS (integration)
// ==============================================
//
// The full secondary-key path: snapshot index (with background
// refreshes) and composite combinators feeding an indexed loading
// cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use readthrough::cache::LoadingCache;
use readthrough::entry::CacheEntry;
use readthrough::index::{
    CompositeKey, IndexSourceFn, IntersectionIndex, IntervalRefresher, SnapshotIndex, UnionIndex,
};
use readthrough::indexed::IndexedLoadingCache;
use readthrough::loader::SingleFlightLoader;
use readthrough::source::GetMultiSource;
use readthrough::storage::InMemoryStorage;
use readthrough::traits::{CacheStorage, Index, IndexSource, LoadingSource, RefreshIndex};

/// A value source answering every key with `item<k>`, counting batches.
fn value_cache(batches: Arc<Mutex<Vec<Vec<u64>>>>) -> LoadingCache<u64, String> {
    let storage = Arc::new(InMemoryStorage::<u64, String>::new());
    let source: Arc<dyn LoadingSource<u64, String>> =
        Arc::new(GetMultiSource::new(move |keys: Vec<u64>| {
            let batches = Arc::clone(&batches);
            async move {
                batches.lock().unwrap().push(keys.clone());
                Ok(keys
                    .into_iter()
                    .map(|k| {
                        Some(CacheEntry::new(
                            k,
                            format!("item{k}"),
                            Instant::now() + Duration::from_secs(3600),
                        ))
                    })
                    .collect())
            }
        }));
    let loader = Arc::new(SingleFlightLoader::new(
        Arc::clone(&storage) as Arc<dyn CacheStorage<u64, String>>,
        source,
    ));
    LoadingCache::new(storage, loader)
}

fn tag_snapshot() -> HashMap<String, Vec<u64>> {
    let mut m = HashMap::new();
    m.insert("cat".to_string(), vec![1, 2, 3]);
    m.insert("dog".to_string(), vec![3, 4]);
    m
}

#[tokio::test]
async fn secondary_lookup_through_a_refreshed_snapshot_index() {
    let index = Arc::new(SnapshotIndex::new(Arc::new(IndexSourceFn::new(|| async {
        Ok(tag_snapshot())
    })) as Arc<dyn IndexSource<String, u64>>));
    index.refresh().await.unwrap();

    let batches = Arc::new(Mutex::new(Vec::new()));
    let cache = IndexedLoadingCache::new(
        value_cache(Arc::clone(&batches)),
        Arc::clone(&index) as Arc<dyn Index<String, u64>>,
    );

    let cats = cache.find_by_secondary_key(&"cat".to_string()).await.unwrap();
    assert_eq!(cats.len(), 3);
    assert_eq!(cats[0].value, "item1");

    // Batched lookup over both tags: key 3 is shared, loaded once.
    let by_tag = cache
        .find_by_secondary_keys(&["cat".to_string(), "dog".to_string()])
        .await
        .unwrap();
    assert_eq!(by_tag.get("cat").unwrap().len(), 3);
    assert_eq!(by_tag.get("dog").unwrap().len(), 2);

    let recorded = batches.lock().unwrap();
    // First call loaded {1,2,3}; second loaded only the residual {4}.
    assert_eq!(recorded.as_slice(), &[vec![1, 2, 3], vec![4]]);
}

#[tokio::test(start_paused = true)]
async fn readers_wait_for_the_background_refresher_to_initialize() {
    let refreshes = Arc::new(AtomicUsize::new(0));
    let refreshes_in_source = Arc::clone(&refreshes);
    let index = Arc::new(SnapshotIndex::new(Arc::new(IndexSourceFn::new(move || {
        let refreshes = Arc::clone(&refreshes_in_source);
        async move {
            // The first snapshot takes 200ms to build.
            tokio::time::sleep(Duration::from_millis(200)).await;
            refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(tag_snapshot())
        }
    })) as Arc<dyn IndexSource<String, u64>>));

    let _refresher = IntervalRefresher::spawn(
        Arc::clone(&index) as Arc<dyn RefreshIndex>,
        Duration::from_secs(60),
        |_err| {},
    );

    // A reader arriving before the first refresh completes blocks on it,
    // then observes the published snapshot.
    let pks = index.get(&"dog".to_string()).await.unwrap();
    assert_eq!(pks, vec![3, 4]);
    assert!(refreshes.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn intersection_feeds_the_indexed_cache() {
    // Left: tag index. Right: availability flag index.
    let tags = Arc::new(SnapshotIndex::new(Arc::new(IndexSourceFn::new(|| async {
        Ok(tag_snapshot())
    })) as Arc<dyn IndexSource<String, u64>>));
    tags.refresh().await.unwrap();

    let flags = Arc::new(SnapshotIndex::new(Arc::new(IndexSourceFn::new(|| async {
        let mut m: HashMap<bool, Vec<u64>> = HashMap::new();
        m.insert(true, vec![2, 3, 4]);
        Ok(m)
    })) as Arc<dyn IndexSource<bool, u64>>));
    flags.refresh().await.unwrap();

    let composite = IntersectionIndex::new(
        Arc::clone(&tags) as Arc<dyn Index<String, u64>>,
        Arc::clone(&flags) as Arc<dyn Index<bool, u64>>,
    );

    // cat ∧ available → {2, 3}.
    let pks = composite
        .get(&CompositeKey::both("cat".to_string(), true))
        .await
        .unwrap();
    let as_set: std::collections::HashSet<u64> = pks.iter().copied().collect();
    assert_eq!(as_set, [2, 3].into_iter().collect::<std::collections::HashSet<u64>>());

    let cache = IndexedLoadingCache::new(
        value_cache(Arc::default()),
        Arc::new(composite) as Arc<dyn Index<CompositeKey<String, bool>, u64>>,
    );
    let entries = cache
        .find_by_secondary_key(&CompositeKey::both("cat".to_string(), true))
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn union_deduplicates_across_sides() {
    let tags = Arc::new(SnapshotIndex::new(Arc::new(IndexSourceFn::new(|| async {
        Ok(tag_snapshot())
    })) as Arc<dyn IndexSource<String, u64>>));
    tags.refresh().await.unwrap();

    let flags = Arc::new(SnapshotIndex::new(Arc::new(IndexSourceFn::new(|| async {
        let mut m: HashMap<bool, Vec<u64>> = HashMap::new();
        m.insert(true, vec![3, 4, 5]);
        Ok(m)
    })) as Arc<dyn IndexSource<bool, u64>>));
    flags.refresh().await.unwrap();

    let composite = UnionIndex::new(
        tags as Arc<dyn Index<String, u64>>,
        flags as Arc<dyn Index<bool, u64>>,
    );

    let pks = composite
        .get(&CompositeKey::both("cat".to_string(), true))
        .await
        .unwrap();
    // {1,2,3} ∪ {3,4,5}: five distinct keys, no duplicates.
    assert_eq!(pks.len(), 5);
    let as_set: std::collections::HashSet<u64> = pks.into_iter().collect();
    assert_eq!(as_set, (1..=5).collect::<std::collections::HashSet<u64>>());
}

#[tokio::test]
async fn snapshot_updates_flow_through_to_secondary_lookups() {
    let generation = Arc::new(AtomicUsize::new(0));
    let generation_in_source = Arc::clone(&generation);
    let index = Arc::new(SnapshotIndex::new(Arc::new(IndexSourceFn::new(move || {
        let generation = Arc::clone(&generation_in_source);
        async move {
            let mut m = HashMap::new();
            if generation.fetch_add(1, Ordering::SeqCst) == 0 {
                m.insert("cat".to_string(), vec![1_u64]);
            } else {
                m.insert("cat".to_string(), vec![1, 9]);
            }
            Ok(m)
        }
    })) as Arc<dyn IndexSource<String, u64>>));
    index.refresh().await.unwrap();

    let cache = IndexedLoadingCache::new(
        value_cache(Arc::default()),
        Arc::clone(&index) as Arc<dyn Index<String, u64>>,
    );

    assert_eq!(cache.find_by_secondary_key(&"cat".to_string()).await.unwrap().len(), 1);

    index.refresh().await.unwrap();
    assert_eq!(cache.find_by_secondary_key(&"cat".to_string()).await.unwrap().len(), 2);
}
