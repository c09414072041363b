//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wire every component into the shared `AppState`
//! - Create the Axum router (proxy, liveness, admin)
//! - Wire up middleware (tracing, outer timeout)
//! - Serve on a listener until shutdown

use axum::{
    body::Body,
    extract::State,
    http::HeaderName,
    routing::{any, get},
    Json, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::BalancerConfig;
use crate::health::HealthChecker;
use crate::http::proxy::proxy_handler;
use crate::load_balancer::{
    LeastConnections, RlRemote, RlStatic, RoundRobin, RoutingStrategy, StrategyKind,
    StrategySelector,
};
use crate::observability::benchmark::BenchmarkTracker;
use crate::observability::metrics::MetricsSink;
use crate::registry::InstanceRegistry;
use crate::rl::{
    ExperienceLogger, ExperienceWorker, FeedbackReporter, FeedbackWorker, ModelStore,
    RlDecisionClient, StateEncoder,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BalancerConfig>,
    pub registry: Arc<InstanceRegistry>,
    pub selector: Arc<StrategySelector>,
    pub metrics: Arc<MetricsSink>,
    pub health: Arc<HealthChecker>,
    pub models: Arc<ModelStore>,
    pub feedback: FeedbackReporter,
    pub experience: ExperienceLogger,
    pub benchmark: Arc<BenchmarkTracker>,
    pub client: Client<HttpConnector, Body>,
    pub trace_header: HeaderName,
    pub started_at: Instant,
}

/// Queue drainers created with the state. They must be spawned.
pub struct Workers {
    pub feedback: FeedbackWorker,
    /// Present only when the experience collector is enabled.
    pub experience: Option<ExperienceWorker>,
}

impl Workers {
    /// Drive every worker on the current task until shutdown.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        match self.experience {
            Some(experience) => {
                let experience = experience.run(shutdown.resubscribe());
                tokio::join!(self.feedback.run(shutdown), experience);
            }
            None => self.feedback.run(shutdown).await,
        }
    }
}

impl AppState {
    /// Build every component from a validated configuration.
    pub fn new(config: BalancerConfig) -> (Self, Workers) {
        let registry = Arc::new(InstanceRegistry::new());
        let metrics = Arc::new(MetricsSink::new());
        registry.add_observer(metrics.clone());

        let models = Arc::new(ModelStore::new(
            config.rl_static.model_dir.as_ref().map(PathBuf::from),
        ));
        if models.dir().is_some() {
            // A failed initial load leaves rl-static on its fallback.
            let _ = models.reload();
        }

        let rl_client = Arc::new(RlDecisionClient::new(&config.rl_remote));
        let (feedback, feedback_worker) =
            FeedbackReporter::channel(rl_client.clone(), config.rl_remote.feedback_queue_size);
        let (experience, experience_worker) = ExperienceLogger::channel(&config.collector);

        let round_robin = Arc::new(RoundRobin::new());
        let least_connections = Arc::new(LeastConnections::new());
        let rl_fallback: Arc<dyn RoutingStrategy> = match config.rl_remote.fallback.parse() {
            Ok(StrategyKind::LeastConnections) => least_connections.clone(),
            _ => round_robin.clone(),
        };
        let rl_remote = Arc::new(RlRemote::new(rl_client, rl_fallback));
        let rl_static = Arc::new(RlStatic::new(
            models.clone(),
            StateEncoder::new(metrics.clone()),
            round_robin.clone(),
        ));

        let initial = config.routing.strategy.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to round-robin");
            StrategyKind::RoundRobin
        });
        let selector = Arc::new(StrategySelector::new(
            registry.clone(),
            initial,
            round_robin,
            least_connections,
            rl_remote,
            rl_static,
        ));

        let health = Arc::new(HealthChecker::new(
            registry.clone(),
            config.health_check.clone(),
        ));
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let trace_header = HeaderName::from_bytes(config.proxy.trace_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-trace-id"));

        let state = Self {
            config: Arc::new(config),
            registry,
            selector,
            metrics,
            health,
            models,
            feedback,
            experience,
            benchmark: Arc::new(BenchmarkTracker::new()),
            client,
            trace_header,
            started_at: Instant::now(),
        };
        let workers = Workers {
            feedback: feedback_worker,
            experience: experience_worker,
        };
        (state, workers)
    }
}

/// Liveness of the balancer itself.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub strategy: StrategyKind,
    pub active_connections: u64,
}

async fn liveness(State(state): State<AppState>) -> Json<Liveness> {
    Json(Liveness {
        status: "UP",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        strategy: state.selector.current(),
        active_connections: state.metrics.active_connections(),
    })
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState) -> Router {
        let prefix = state.config.proxy.route_prefix.trim_end_matches('/').to_string();
        // The downstream timeout fires first; this bounds admin calls too.
        let outer_timeout = state.config.proxy.timeout() + Duration::from_secs(5);

        Router::new()
            .route(&format!("{prefix}/{{service}}"), any(proxy_handler))
            .route(&format!("{prefix}/{{service}}/{{*rest}}"), any(proxy_handler))
            .route("/health", get(liveness))
            .merge(admin::setup_admin_router(state.clone()))
            .with_state(state)
            .layer(TimeoutLayer::new(outer_timeout))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
