use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use consul_ingress::apply::document_hash;
use consul_ingress::health::HealthResponse;
use consul_ingress::server::{build_router, AppState, AppliedRecord};

async fn start_status_server(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    addr
}

async fn fetch_health(addr: SocketAddr) -> HealthResponse {
    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn health_reports_fresh_instance() {
    let addr = start_status_server(Arc::new(AppState::new(false))).await;

    let health = fetch_health(addr).await;

    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.sources.catalog.index, 0);
    assert_eq!(health.sources.catalog.updates, 0);
    assert!(health.sources.kv.is_none());
    assert!(health.applied.is_none());
    assert_eq!(health.stats.applied, 0);
}

#[tokio::test]
async fn health_reports_watcher_and_apply_progress() {
    let state = Arc::new(AppState::new(true));
    state.catalog.record(42, 3);
    state.catalog.record(43, 4);
    if let Some(kv) = &state.kv {
        kv.record(7, 1);
    }
    let hash = document_hash("api.example.com {\n}");
    *state.applied.write().await = Some(AppliedRecord {
        hash: hash.clone(),
        applied_at: Instant::now(),
    });
    state.stats.applied.fetch_add(2, Ordering::Relaxed);
    state.stats.unchanged.fetch_add(5, Ordering::Relaxed);
    state.stats.failed.fetch_add(1, Ordering::Relaxed);
    let addr = start_status_server(Arc::clone(&state)).await;

    let health = fetch_health(addr).await;

    assert_eq!(health.sources.catalog.index, 43);
    assert_eq!(health.sources.catalog.routes, 4);
    assert_eq!(health.sources.catalog.updates, 2);
    let kv = health.sources.kv.unwrap();
    assert_eq!((kv.index, kv.routes, kv.updates), (7, 1, 1));

    let applied = health.applied.unwrap();
    assert_eq!(applied.hash, hash[..8]);
    assert!(applied.applied_ago_seconds < 5);

    assert_eq!(health.stats.applied, 2);
    assert_eq!(health.stats.unchanged, 5);
    assert_eq!(health.stats.failed, 1);
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let addr = start_status_server(Arc::new(AppState::new(false))).await;

    let response = reqwest::get(format!("http://{addr}/status")).await.unwrap();

    assert_eq!(response.status(), 404);
}
