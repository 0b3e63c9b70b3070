//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload with the version, uptime,
//! each watcher's last registry index and route count, the short hash of
//! the last applied Caddyfile, and apply counters.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::apply;
use crate::server::{AppState, SourceStatus};

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git: String,
    pub uptime_seconds: u64,
    pub sources: SourcesHealth,
    pub applied: Option<AppliedHealth>,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct SourcesHealth {
    pub catalog: SourceHealth,
    pub kv: Option<SourceHealth>,
}

#[derive(Serialize, Deserialize)]
pub struct SourceHealth {
    pub index: u64,
    pub routes: u64,
    pub updates: u64,
}

impl From<&SourceStatus> for SourceHealth {
    fn from(status: &SourceStatus) -> Self {
        Self {
            index: status.index.load(Ordering::Relaxed),
            routes: status.routes.load(Ordering::Relaxed),
            updates: status.updates.load(Ordering::Relaxed),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct AppliedHealth {
    pub hash: String,
    pub applied_ago_seconds: u64,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub applied: u64,
    pub unchanged: u64,
    pub failed: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let applied = state.applied.read().await.as_ref().map(|record| AppliedHealth {
        hash: apply::short(&record.hash).to_string(),
        applied_ago_seconds: record.applied_at.elapsed().as_secs(),
    });

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git: env!("CONSUL_INGRESS_GIT_SHORT").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        sources: SourcesHealth {
            catalog: SourceHealth::from(state.catalog.as_ref()),
            kv: state.kv.as_deref().map(SourceHealth::from),
        },
        applied,
        stats: StatsResponse {
            applied: state.stats.applied.load(Ordering::Relaxed),
            unchanged: state.stats.unchanged.load(Ordering::Relaxed),
            failed: state.stats.failed.load(Ordering::Relaxed),
        },
    })
}
