//! Admin surface: registry CRUD, metrics snapshots, RL control, strategy benchmarks.
//!
//! Every route here sits behind the bearer-key check when `admin.api_key` is set.

pub mod auth;
pub mod benchmark;
pub mod handlers;
pub mod rl;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/services", get(list_services))
        .route("/api/services/status", get(registry_status))
        .route(
            "/api/services/{service}",
            get(get_service).post(register_service),
        )
        .route(
            "/api/services/{service}/instances",
            post(add_instance).delete(remove_instance),
        )
        .route(
            "/api/services/{service}/instances/{instance_url}/health-check",
            post(force_health_check),
        )
        .route("/api/metrics/{service}", get(service_metrics))
        .route("/rl/status", get(rl::status))
        .route("/rl/reload", post(rl::reload))
        .route("/rl/reset-stats", post(rl::reset_stats))
        .route("/rl/strategies", get(rl::strategies))
        .route("/rl/strategy", post(rl::switch_strategy))
        .route("/api/benchmark/start", post(benchmark::start))
        .route("/api/benchmark/stop", post(benchmark::stop))
        .route("/api/benchmark/status", get(benchmark::status))
        .route("/api/benchmark/switch", post(benchmark::switch))
        .route("/api/benchmark/reset", post(benchmark::reset))
        .route("/api/benchmark/results", get(benchmark::results))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
