//! Shared runtime state, HTTP client, status server, and shutdown handling.
//!
//! Contains [`AppState`] (the `Arc`-shared view of watcher progress and
//! the last applied document), [`build_http_client`] for the pooled hyper
//! client used against Consul and Caddy, [`build_router`] for the
//! optional status endpoint, and [`shutdown_signal`] for SIGTERM / Ctrl+C
//! handling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::health::health_handler;

/// Progress of one registry watcher.
#[derive(Debug, Default)]
pub struct SourceStatus {
    pub index: AtomicU64,
    pub routes: AtomicU64,
    pub updates: AtomicU64,
}

impl SourceStatus {
    pub fn record(&self, index: u64, routes: usize) {
        self.index.store(index, Ordering::Relaxed);
        self.routes.store(routes as u64, Ordering::Relaxed);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct AppliedRecord {
    pub hash: String,
    pub applied_at: Instant,
}

#[derive(Debug)]
pub struct Stats {
    pub applied: AtomicU64,
    pub unchanged: AtomicU64,
    pub failed: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            applied: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

pub struct AppState {
    pub start_time: Instant,
    pub catalog: Arc<SourceStatus>,
    /// `None` when KV watching is disabled.
    pub kv: Option<Arc<SourceStatus>>,
    pub applied: RwLock<Option<AppliedRecord>>,
    pub stats: Stats,
}

impl AppState {
    #[must_use]
    pub fn new(kv_enabled: bool) -> Self {
        Self {
            start_time: Instant::now(),
            catalog: Arc::new(SourceStatus::default()),
            kv: kv_enabled.then(|| Arc::new(SourceStatus::default())),
            applied: RwLock::new(None),
            stats: Stats::new(),
        }
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

#[must_use]
pub fn build_http_client() -> HttpClient {
    // Several rustls providers may be compiled in; pin ring explicitly.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
