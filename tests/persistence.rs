//! Counter durability across process restarts and both strategies.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, header},
};
use tower::ServiceExt;

use jairo::{
    application::{
        snapshot::SnapshotCell,
        stats::{CachedStats, DurableStats},
    },
    domain::counters::CounterPair,
    infra::{
        assets::AssetSource,
        http::{CounterRuntime, HttpState, build_router},
        store::StatsStore,
    },
    presentation::views::render_homepage,
};

fn durable_router(store: Arc<StatsStore>, like_decrements_visits: bool) -> axum::Router {
    build_router(HttpState {
        counters: CounterRuntime::Durable {
            stats: Arc::new(DurableStats::new(store, like_decrements_visits)),
        },
        assets: Arc::new(AssetSource::Bundled),
    })
}

async fn post_like(router: &axum::Router) {
    let response = router
        .clone()
        .oneshot(
            Request::post("/like")
                .header(header::REFERER, "/")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert!(response.status().is_redirection());
}

#[test]
fn first_run_starts_from_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StatsStore::open(dir.path().join("jairo.db")).expect("open");
    assert_eq!(store.load().expect("load"), CounterPair::default());
}

#[test]
fn counters_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("jairo.db");

    {
        let store = StatsStore::open(&path).expect("open");
        store.save(CounterPair::new(1234, 56)).expect("save");
    }

    let store = StatsStore::open(&path).expect("reopen");
    assert_eq!(store.load().expect("load"), CounterPair::new(1234, 56));
}

#[tokio::test]
async fn durable_likes_through_http_accumulate_exactly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(StatsStore::open(dir.path().join("jairo.db")).expect("open"));
    store.save(CounterPair::new(10, 2)).expect("seed");

    let router = durable_router(Arc::clone(&store), false);
    for _ in 0..3 {
        post_like(&router).await;
    }

    assert_eq!(store.load().expect("load"), CounterPair::new(10, 5));
}

#[tokio::test]
async fn compatibility_mode_decrements_a_visit_per_like() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(StatsStore::open(dir.path().join("jairo.db")).expect("open"));
    store.save(CounterPair::new(10, 2)).expect("seed");

    let router = durable_router(Arc::clone(&store), true);
    for _ in 0..3 {
        post_like(&router).await;
    }

    assert_eq!(store.load().expect("load"), CounterPair::new(7, 5));
}

#[tokio::test]
async fn cached_increments_reach_disk_on_flush() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(StatsStore::open(dir.path().join("jairo.db")).expect("open"));
    let seed = CounterPair::new(100, 20);
    let stats = Arc::new(CachedStats::new(Arc::clone(&store), seed));
    let snapshot = Arc::new(SnapshotCell::new(render_homepage(seed).expect("render")));
    let router = build_router(HttpState {
        counters: CounterRuntime::Cached {
            stats: Arc::clone(&stats),
            snapshot,
        },
        assets: Arc::new(AssetSource::Bundled),
    });

    post_like(&router).await;
    post_like(&router).await;

    // Nothing hits the disk until a flush tick.
    assert_eq!(store.load().expect("load"), CounterPair::default());

    stats.flush().expect("flush");
    assert_eq!(store.load().expect("load"), CounterPair::new(100, 22));
}

#[tokio::test]
async fn cached_state_survives_a_simulated_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("jairo.db");

    {
        let store = Arc::new(StatsStore::open(&path).expect("open"));
        let stats = CachedStats::new(Arc::clone(&store), store.load().expect("load"));
        stats.record_visit();
        stats.record_like();
        stats.flush().expect("flush");
    }

    let store = StatsStore::open(&path).expect("reopen");
    let reloaded = store.load().expect("load");
    assert_eq!(reloaded, CounterPair::new(1, 1));
}
