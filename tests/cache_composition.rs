//! Composing the cache wrappers the way an application would.

use keel_cache::{
    Cache, CacheError, JitteredCache, Loader, LocalCache, ReadThroughCache, WriteThroughCache,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[tokio::test]
async fn read_through_over_a_local_cache() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let loader: Loader<String> = Arc::new(move |key: String| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("db:{key}"))
        })
    });
    let cache = ReadThroughCache::new(
        LocalCache::builder().build(),
        loader,
        Duration::from_secs(60),
    );

    assert_eq!(cache.get("a").await.unwrap(), "db:a");
    assert_eq!(cache.get("a").await.unwrap(), "db:a");
    assert_eq!(loads.load(Ordering::SeqCst), 1, "second read must be a hit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stampede_is_absorbed_by_the_composition() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let loader: Loader<String> = Arc::new(move |key: String| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(format!("db:{key}"))
        })
    });
    // Jitter over read-through over the local store: the wrappers stack.
    let cache = Arc::new(JitteredCache::new(ReadThroughCache::new(
        LocalCache::builder().build(),
        loader,
        Duration::from_secs(60),
    )));

    let mut tasks = Vec::new();
    for _ in 0..24 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move { cache.get("hot").await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "db:hot");
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn write_through_keeps_store_and_cache_aligned() {
    let store: Arc<Mutex<Vec<(String, i64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&store);
    let cache = WriteThroughCache::new(
        LocalCache::builder().build(),
        Arc::new(move |key: String, val: i64| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().await.push((key, val));
                Ok(())
            })
        }),
    );

    cache.set("a", 10, Duration::ZERO).await.unwrap();
    cache.set("b", 20, Duration::ZERO).await.unwrap();
    assert_eq!(cache.get("a").await.unwrap(), 10);
    assert_eq!(
        store.lock().await.as_slice(),
        &[("a".to_string(), 10), ("b".to_string(), 20)]
    );
}

#[tokio::test]
async fn load_and_delete_hands_the_value_over_once() {
    let cache: LocalCache<String> = LocalCache::builder().build();
    cache
        .set("token", "secret".to_string(), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(cache.load_and_delete("token").await.unwrap(), "secret");
    let err = cache.load_and_delete("token").await.unwrap_err();
    assert!(matches!(err, CacheError::KeyNotFound(_)));
}
