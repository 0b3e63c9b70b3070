//! Throwaway axum servers standing in for a Consul agent and the Caddy admin API.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};

/// How long the mock holds a blocking query whose index is already current.
const BLOCK_FOR: Duration = Duration::from_millis(50);

pub struct MockConsul {
    pub index: AtomicU64,
    pub services: Mutex<Value>,
    /// `None` answers the KV read with 404.
    pub kv: Mutex<Option<Vec<(String, String)>>>,
    pub fail_next: AtomicBool,
    pub requests: AtomicU64,
    pub last_token: Mutex<Option<String>>,
}

impl MockConsul {
    pub fn new(index: u64, services: Value) -> Arc<Self> {
        Arc::new(Self {
            index: AtomicU64::new(index),
            services: Mutex::new(services),
            kv: Mutex::new(None),
            fail_next: AtomicBool::new(false),
            requests: AtomicU64::new(0),
            last_token: Mutex::new(None),
        })
    }

    pub fn set_services(&self, index: u64, services: Value) {
        *self.services.lock().unwrap() = services;
        self.index.store(index, Ordering::SeqCst);
    }

    pub fn set_kv(&self, index: u64, pairs: &[(&str, &str)]) {
        *self.kv.lock().unwrap() = Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        self.index.store(index, Ordering::SeqCst);
    }

    /// Records the request and holds it open if the caller is already up to date.
    async fn block(&self, uri: &Uri, headers: &HeaderMap) -> Option<u64> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.last_token.lock().unwrap() = headers
            .get("x-consul-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return None;
        }

        let waited: u64 = uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == "index")
                    .and_then(|(_, v)| v.parse().ok())
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        let current = self.index.load(Ordering::SeqCst);
        if waited >= current {
            tokio::time::sleep(BLOCK_FOR).await;
        }
        Some(self.index.load(Ordering::SeqCst))
    }
}

async fn catalog_services(
    State(consul): State<Arc<MockConsul>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let Some(index) = consul.block(&uri, &headers).await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let services = consul.services.lock().unwrap().clone();
    ([("x-consul-index", index.to_string())], Json(services)).into_response()
}

async fn kv_routes(
    State(consul): State<Arc<MockConsul>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let Some(index) = consul.block(&uri, &headers).await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let pairs = consul.kv.lock().unwrap().clone();
    match pairs {
        None => (StatusCode::NOT_FOUND, [("x-consul-index", index.to_string())]).into_response(),
        Some(pairs) => {
            let body: Vec<Value> = pairs
                .iter()
                .map(|(key, value)| {
                    json!({
                        "Key": key,
                        "Value": general_purpose::STANDARD.encode(value),
                        "Flags": 0,
                    })
                })
                .chain(std::iter::once(json!({"Key": "caddy-routes/", "Value": null})))
                .collect();
            ([("x-consul-index", index.to_string())], Json(Value::Array(body))).into_response()
        }
    }
}

pub async fn start_consul(consul: Arc<MockConsul>) -> SocketAddr {
    let router = Router::new()
        .route("/v1/catalog/services", get(catalog_services))
        .route("/v1/kv/caddy-routes", get(kv_routes))
        .with_state(consul);
    serve(router).await
}

#[derive(Default)]
pub struct MockCaddy {
    /// `(content type, body)` of every POST /load.
    pub loads: Mutex<Vec<(String, String)>>,
    pub adapts: Mutex<Vec<String>>,
    pub reject: AtomicBool,
}

impl MockCaddy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().unwrap().len()
    }

    pub fn last_load(&self) -> Option<(String, String)> {
        self.loads.lock().unwrap().last().cloned()
    }
}

async fn load(State(caddy): State<Arc<MockCaddy>>, headers: HeaderMap, body: String) -> Response {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    caddy.loads.lock().unwrap().push((content_type, body));

    if caddy.reject.load(Ordering::SeqCst) {
        return (StatusCode::BAD_REQUEST, "adapting config using caddyfile: unrecognized directive").into_response();
    }
    StatusCode::OK.into_response()
}

async fn adapt(State(caddy): State<Arc<MockCaddy>>, body: String) -> Json<Value> {
    caddy.adapts.lock().unwrap().push(body.clone());
    Json(json!({
        "result": {"apps": {"http": {"servers": {}}}, "source": body},
        "warnings": [{"file": "Caddyfile", "line": 2, "message": "input is not formatted"}],
    }))
}

pub async fn start_caddy(caddy: Arc<MockCaddy>) -> SocketAddr {
    let router = Router::new()
        .route("/load", post(load))
        .route("/adapt", post(adapt))
        .with_state(caddy);
    serve(router).await
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
