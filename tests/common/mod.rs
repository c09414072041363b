//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ai_load_balancer::config::BalancerConfig;
use ai_load_balancer::{AppState, HttpServer, Shutdown};
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Serve a router on an ephemeral localhost port.
pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[derive(Clone)]
struct BackendState {
    name: &'static str,
    status: StatusCode,
    delay: Duration,
    hits: Arc<AtomicUsize>,
}

/// A mock downstream instance that echoes what it received.
pub struct MockBackend {
    pub name: &'static str,
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn health_url(&self) -> String {
        format!("http://{}/actuator/health", self.addr)
    }

    /// Proxied requests served, excluding health probes.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn start_backend(name: &'static str) -> MockBackend {
    start_backend_with(name, StatusCode::OK, Duration::ZERO).await
}

pub async fn start_slow_backend(name: &'static str, delay: Duration) -> MockBackend {
    start_backend_with(name, StatusCode::OK, delay).await
}

/// Start a backend answering every proxied request with `status` after `delay`.
pub async fn start_backend_with(
    name: &'static str,
    status: StatusCode,
    delay: Duration,
) -> MockBackend {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = BackendState {
        name,
        status,
        delay,
        hits: hits.clone(),
    };
    let router = Router::new()
        .route("/", any(echo))
        .route("/{*rest}", any(echo))
        .with_state(state);
    let addr = spawn_router(router).await;
    MockBackend { name, addr, hits }
}

async fn echo(State(state): State<BackendState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    if parts.uri.path() == "/actuator/health" {
        return Json(json!({ "status": "UP" })).into_response();
    }

    state.hits.fetch_add(1, Ordering::SeqCst);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    (
        state.status,
        [("x-served-by", state.name)],
        Json(echo_body(state.name, &parts.method, &parts.uri, &parts.headers, &body)),
    )
        .into_response()
}

fn echo_body(name: &str, method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> Value {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    json!({
        "instance": name,
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(body),
    })
}

/// Configuration with every background concern turned off.
pub fn test_config() -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.proxy.timeout_ms = 2_000;
    config.discovery.enabled = false;
    config.health_check.enabled = false;
    config.observability.metrics_enabled = false;
    config.rl_static.watch = false;
    // Nothing listens on port 1.
    config.rl_remote.base_url = "http://127.0.0.1:1".into();
    config.rl_remote.decision_timeout_ms = 200;
    config.rl_remote.feedback_timeout_ms = 500;
    config
}

/// A running balancer.
pub struct TestBalancer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
}

impl TestBalancer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn register(&self, service: &str, backend: &MockBackend) {
        self.state.registry.add_instance(
            service,
            &backend.url(),
            &backend.health_url(),
            backend.name,
        );
    }
}

impl Drop for TestBalancer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Build the state, spawn its queue workers and serve on an ephemeral port.
pub async fn start_balancer(config: BalancerConfig) -> TestBalancer {
    let (state, workers) = AppState::new(config);
    let shutdown = Shutdown::new();
    tokio::spawn(workers.run(shutdown.subscribe()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(state.clone());
    let mut rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server
            .run(listener, async move {
                let _ = rx.recv().await;
            })
            .await;
    });

    TestBalancer {
        addr,
        state,
        shutdown,
    }
}

/// Non-pooled client that ignores proxy environment variables.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
