//! Concurrent callers share one catalog refresh

mod common;

use common::*;
use futures::future::join_all;
use koko_keywords_core::catalog::{Dataset, KeywordEntry, StaticCatalogSource};
use koko_keywords_core::error::MATCH;
use koko_keywords_core::{BindingMatcher, KeywordsError};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::time::Duration;

const CALLERS: usize = 32;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cold_start_fetches_exactly_once() {
    init_test_logging();
    let source = StaticCatalogSource::new(datasets())
        .with_endpoint(ENDPOINT)
        .with_latency(Duration::from_millis(100));
    let fetches = source.fetch_counter();
    let m = matcher_with(Arc::new(source), &config());

    let tasks = (0..CALLERS).map(|_| {
        let m = m.clone();
        tokio::spawn(async move { m.cache().get_index(None).await })
    });

    let indexes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    let first = &indexes[0];
    assert!(indexes.iter().all(|index| Arc::ptr_eq(index, first)));
    assert_eq!(first.version(), "20220206");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_is_shared_by_every_waiter() {
    init_test_logging();
    let source = Arc::new(
        ScriptedSource::new(vec![Err(KeywordsError::AuthInvalid { status: 401 })])
            .with_latency(Duration::from_millis(100)),
    );
    let m = matcher_with(source.clone(), &config());

    let tasks = (0..CALLERS).map(|_| {
        let m = m.clone();
        tokio::spawn(async move { m.matches("sewerslide", None, None).await })
    });

    for joined in join_all(tasks).await {
        let outcome = joined.unwrap();
        assert!(matches!(outcome, Err(KeywordsError::AuthInvalid { status: 401 })));
    }
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pinned_and_latest_callers_both_get_their_answer() {
    init_test_logging();
    let source = StaticCatalogSource::new(datasets())
        .with_endpoint(ENDPOINT)
        .with_latency(Duration::from_millis(50));
    let m = matcher_with(Arc::new(source), &config());

    let pinned = {
        let m = m.clone();
        tokio::spawn(async move { m.cache().get_index(Some("20220101")).await })
    };
    let latest = {
        let m = m.clone();
        tokio::spawn(async move { m.cache().get_index(None).await })
    };

    assert_eq!(pinned.await.unwrap().unwrap().version(), "20220101");

    // Either its own refresh, or the pinned one if it joined that while fresh
    let latest = latest.await.unwrap().unwrap();
    assert!(["20220101", "20220206"].contains(&latest.version()));
}

#[test]
fn test_blocking_callers_on_many_threads_share_one_fetch() {
    init_test_logging();
    let source = Arc::new(
        ScriptedSource::new(vec![Ok(Dataset::new(
            "20220206",
            vec![KeywordEntry::new("sewerslide", "self-harm")],
        ))])
        .with_latency(Duration::from_millis(100)),
    );
    let binding = BindingMatcher::from_matcher(matcher_with(source.clone(), &config())).unwrap();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let binding = binding.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                binding.match_code("sewer slide", None, None)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), MATCH);
    }
    assert_eq!(source.fetch_count(), 1);

    // Served from the cache; the exhausted script is never consulted
    assert_eq!(binding.match_code("sewerslide", None, None), MATCH);
    assert_eq!(source.fetch_count(), 1);
}
