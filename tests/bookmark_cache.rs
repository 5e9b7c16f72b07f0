//! Bookmark cache service and manager behaviour over in-memory stores.

mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bahk::cache::{CacheConfig, KeyValueStore, MemoryStore};
use bahk::domain::content::{ContentKind, ContentRef};
use bahk::domain::types::Viewer;

use support::{CountingStore, FailingStore, HangingStore, Harness, memory_config};

#[tokio::test]
async fn preload_then_get_matches_relational_rows() {
    let harness = Harness::new();
    let video = harness.content_type(ContentKind::Video);
    let article = harness.content_type(ContentKind::Article);
    harness.db.add_user(1);
    harness.db.seed_bookmark(1, video, 10);
    harness.db.seed_bookmark(1, video, 11);
    harness.db.seed_bookmark(1, article, 10);
    harness.db.seed_bookmark(2, video, 12);

    let preloaded = harness.cache.preload_user_bookmarks(1, video).await;
    let cached = harness
        .cache
        .get_user_bookmarks(1, video)
        .await
        .expect("entry after preload");

    assert_eq!(preloaded, HashSet::from([10, 11]));
    assert_eq!(cached, preloaded);
}

#[tokio::test]
async fn preload_of_empty_set_is_cached_as_empty() {
    let harness = Harness::new();
    let recipe = harness.content_type(ContentKind::Recipe);

    assert!(harness.cache.preload_user_bookmarks(5, recipe).await.is_empty());
    assert_eq!(
        harness.cache.get_user_bookmarks(5, recipe).await,
        Some(HashSet::new())
    );
}

#[tokio::test]
async fn add_only_updates_existing_entries() {
    let harness = Harness::new();
    let video = harness.content_type(ContentKind::Video);

    assert!(!harness.cache.add_bookmark_to_cache(1, video, 42).await);
    assert_eq!(harness.cache.get_user_bookmarks(1, video).await, None);

    harness.cache.preload_user_bookmarks(1, video).await;
    assert!(harness.cache.add_bookmark_to_cache(1, video, 42).await);
    assert_eq!(
        harness.cache.get_user_bookmarks(1, video).await,
        Some(HashSet::from([42]))
    );
}

#[tokio::test]
async fn remove_without_entry_is_a_no_op() {
    let harness = Harness::new();
    let video = harness.content_type(ContentKind::Video);

    assert!(!harness.cache.remove_bookmark_from_cache(1, video, 42).await);
    assert_eq!(harness.cache.get_user_bookmarks(1, video).await, None);
}

#[tokio::test]
async fn remove_many_reports_present_ids() {
    let harness = Harness::new();
    let video = harness.content_type(ContentKind::Video);
    harness
        .cache
        .set_user_bookmarks(1, video, &HashSet::from([1, 2, 3]))
        .await;

    let removed = harness.cache.remove_many_from_cache(1, video, &[1, 3, 9]).await;

    assert_eq!(removed, 2);
    assert_eq!(
        harness.cache.get_user_bookmarks(1, video).await,
        Some(HashSet::from([2]))
    );
}

#[tokio::test]
async fn invalidate_without_type_drops_every_kind() {
    let harness = Harness::new();
    for kind in ContentKind::ALL {
        let content_type = harness.content_type(kind);
        harness.cache.preload_user_bookmarks(1, content_type).await;
        harness.cache.preload_user_bookmarks(2, content_type).await;
    }

    assert!(harness.cache.invalidate_user_bookmarks(1, None).await);

    for kind in ContentKind::ALL {
        let content_type = harness.content_type(kind);
        assert_eq!(harness.cache.get_user_bookmarks(1, content_type).await, None);
        assert!(harness.cache.get_user_bookmarks(2, content_type).await.is_some());
    }
}

#[tokio::test]
async fn invalidate_single_type_keeps_the_others() {
    let harness = Harness::new();
    let video = harness.content_type(ContentKind::Video);
    let article = harness.content_type(ContentKind::Article);
    harness.cache.preload_user_bookmarks(1, video).await;
    harness.cache.preload_user_bookmarks(1, article).await;

    harness.cache.invalidate_user_bookmarks(1, Some(video)).await;

    assert_eq!(harness.cache.get_user_bookmarks(1, video).await, None);
    assert!(harness.cache.get_user_bookmarks(1, article).await.is_some());
}

#[tokio::test]
async fn anonymous_viewer_never_reaches_the_backend() {
    let store = Arc::new(CountingStore::default());
    let harness = Harness::with_store(store.clone());
    let objects = [
        ContentRef::new(ContentKind::Video, 1),
        ContentRef::new(ContentKind::Article, 2),
    ];

    assert!(!harness.manager.is_bookmarked(Viewer::Anonymous, &objects[0]).await);
    assert!(
        harness
            .manager
            .bookmarks_for_objects(Viewer::Anonymous, &objects)
            .await
            .is_empty()
    );
    assert_eq!(
        harness
            .cache
            .get_user_bookmarks(Viewer::from(None), harness.content_type(ContentKind::Video))
            .await,
        None
    );

    assert_eq!(store.gets(), 0);
    assert_eq!(harness.db.object_id_reads(), 0);
}

#[tokio::test]
async fn batch_lookup_reads_once_per_content_type() {
    let store = Arc::new(CountingStore::default());
    let harness = Harness::with_store(store.clone());
    let video = harness.content_type(ContentKind::Video);
    harness.db.seed_bookmark(1, video, 3);
    harness.db.seed_bookmark(1, harness.content_type(ContentKind::Recipe), 107);

    let mut objects: Vec<ContentRef> = (1..=40)
        .map(|id| ContentRef::new(ContentKind::Video, id))
        .collect();
    objects.extend((101..=125).map(|id| ContentRef::new(ContentKind::Recipe, id)));

    let status = harness.manager.bookmarks_for_objects(1, &objects).await;

    assert_eq!(store.gets(), 2);
    assert_eq!(harness.db.object_id_reads(), 2);
    assert_eq!(status.len(), 65);
    assert_eq!(status.get(&3), Some(&true));
    assert_eq!(status.get(&107), Some(&true));
    assert_eq!(status.get(&4), Some(&false));
    assert_eq!(status.get(&101), Some(&false));

    harness.manager.bookmarks_for_objects(1, &objects).await;
    assert_eq!(store.gets(), 4);
    assert_eq!(harness.db.object_id_reads(), 2, "second call is served from cache");
}

#[tokio::test]
async fn shared_object_id_takes_the_last_content_type_seen() {
    let harness = Harness::new();
    let video = harness.content_type(ContentKind::Video);
    harness.db.seed_bookmark(1, video, 7);

    let video_last = [
        ContentRef::new(ContentKind::Article, 7),
        ContentRef::new(ContentKind::Video, 7),
    ];
    let article_last = [
        ContentRef::new(ContentKind::Video, 7),
        ContentRef::new(ContentKind::Article, 7),
        ContentRef::new(ContentKind::Video, 8),
    ];

    for _ in 0..20 {
        let status = harness.manager.bookmarks_for_objects(1, &video_last).await;
        assert_eq!(status.get(&7), Some(&true));

        let status = harness.manager.bookmarks_for_objects(1, &article_last).await;
        assert_eq!(status.get(&7), Some(&false));
        assert_eq!(status.get(&8), Some(&false));
    }
}

#[tokio::test]
async fn is_bookmarked_preloads_on_miss() {
    let harness = Harness::new();
    let video = harness.content_type(ContentKind::Video);
    harness.db.seed_bookmark(1, video, 9);

    assert!(
        harness
            .manager
            .is_bookmarked(1, &ContentRef::new(ContentKind::Video, 9))
            .await
    );
    assert!(
        !harness
            .manager
            .is_bookmarked(1, &ContentRef::new(ContentKind::Video, 8))
            .await
    );
    assert_eq!(harness.db.object_id_reads(), 1);
    assert_eq!(
        harness.cache.get_user_bookmarks(1, video).await,
        Some(HashSet::from([9]))
    );
}

#[tokio::test]
async fn unreachable_backend_degrades_to_database_reads() {
    let harness = Harness::with_store(Arc::new(FailingStore));
    let video = harness.content_type(ContentKind::Video);
    harness.db.seed_bookmark(1, video, 5);

    assert_eq!(harness.cache.get_user_bookmarks(1, video).await, None);
    assert!(
        !harness
            .cache
            .set_user_bookmarks(1, video, &HashSet::from([5]))
            .await
    );
    assert!(!harness.cache.invalidate_user_bookmarks(1, None).await);
    assert_eq!(
        harness.cache.preload_user_bookmarks(1, video).await,
        HashSet::from([5])
    );
    assert!(
        harness
            .manager
            .is_bookmarked(1, &ContentRef::new(ContentKind::Video, 5))
            .await
    );

    let stats = harness.cache.cache_stats().await;
    assert!(!stats.available);
    assert!(stats.error.is_some());
}

#[tokio::test]
async fn timed_out_backend_degrades_to_database_reads() {
    let config = CacheConfig {
        operation_timeout_ms: 20,
        ..memory_config()
    };
    let harness = Harness::with_config(Arc::new(HangingStore), config);
    let video = harness.content_type(ContentKind::Video);
    harness.db.seed_bookmark(1, video, 5);

    assert_eq!(harness.cache.get_user_bookmarks(1, video).await, None);
    assert_eq!(
        harness.cache.preload_user_bookmarks(1, video).await,
        HashSet::from([5])
    );
    assert!(!harness.cache.add_bookmark_to_cache(1, video, 6).await);
    assert!(
        harness
            .manager
            .is_bookmarked(1, &ContentRef::new(ContentKind::Video, 5))
            .await
    );

    let stats = harness.cache.cache_stats().await;
    assert!(!stats.available);
}

#[tokio::test]
async fn hits_refresh_the_ttl() {
    let config = CacheConfig {
        ttl_secs: 1,
        ..memory_config()
    };
    let harness = Harness::with_config(Arc::new(MemoryStore::new()), config);
    let video = harness.content_type(ContentKind::Video);
    harness.db.seed_bookmark(1, video, 5);
    harness.cache.preload_user_bookmarks(1, video).await;

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(
            harness.cache.get_user_bookmarks(1, video).await,
            Some(HashSet::from([5]))
        );
    }

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(harness.cache.get_user_bookmarks(1, video).await, None);
}

#[tokio::test]
async fn disabled_cache_always_misses() {
    let config = CacheConfig {
        enabled: false,
        ..memory_config()
    };
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::with_config(store.clone(), config);
    let video = harness.content_type(ContentKind::Video);
    harness.db.seed_bookmark(1, video, 5);

    assert_eq!(
        harness.cache.preload_user_bookmarks(1, video).await,
        HashSet::from([5])
    );
    assert_eq!(harness.cache.get_user_bookmarks(1, video).await, None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn stats_count_keys_and_hit_ratio() {
    let harness = Harness::new();
    let video = harness.content_type(ContentKind::Video);
    harness.cache.preload_user_bookmarks(1, video).await;
    harness.cache.preload_user_bookmarks(2, video).await;

    harness.cache.get_user_bookmarks(1, video).await;
    harness.cache.get_user_bookmarks(3, video).await;

    let stats = harness.cache.cache_stats().await;
    assert!(stats.available);
    assert_eq!(stats.backend, "memory");
    assert_eq!(stats.total_keys, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_ratio, Some(0.5));
}

#[tokio::test]
async fn corrupt_entries_read_as_miss() {
    let store = Arc::new(MemoryStore::new());
    let harness = Harness::with_store(store.clone());
    let video = harness.content_type(ContentKind::Video);
    store
        .set(
            &format!("bookmarks:user:1:ct:{video}"),
            "not json".to_string(),
            Duration::from_secs(60),
        )
        .await
        .expect("memory store accepts writes");

    assert_eq!(harness.cache.get_user_bookmarks(1, video).await, None);
    assert!(!harness.cache.add_bookmark_to_cache(1, video, 1).await);
}
