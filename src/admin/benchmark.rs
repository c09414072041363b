//! Strategy benchmarking: start, stop, switch and read the comparison.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::handlers::ApiError;
use crate::http::server::AppState;
use crate::load_balancer::StrategyKind;
use crate::observability::benchmark::{BenchmarkReport, BenchmarkStatus};

fn parse_algorithm(name: &str) -> Result<StrategyKind, ApiError> {
    name.parse().map_err(|_| {
        let available: Vec<&str> = StrategyKind::ALL.iter().map(|k| k.as_str()).collect();
        ApiError::bad_request(format!(
            "Invalid algorithm: {name} (available: {})",
            available.join(", ")
        ))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartParams {
    #[serde(default = "default_duration")]
    pub duration_minutes: u64,
    pub start_algorithm: Option<String>,
}

fn default_duration() -> u64 {
    60
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Started {
    pub status: &'static str,
    pub duration_minutes: u64,
    pub current_algorithm: StrategyKind,
    pub test_algorithms: Vec<StrategyKind>,
    pub start_time: u64,
}

pub async fn start(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> Result<Json<Started>, ApiError> {
    let initial = match params.start_algorithm.as_deref() {
        Some(name) => parse_algorithm(name)?,
        None => state.selector.current(),
    };

    let start_time = state
        .benchmark
        .start(initial, params.duration_minutes)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    state.selector.switch(initial);

    Ok(Json(Started {
        status: "started",
        duration_minutes: params.duration_minutes,
        current_algorithm: initial,
        test_algorithms: StrategyKind::ALL.to_vec(),
        start_time,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stopped {
    pub status: &'static str,
    pub total_duration_ms: u64,
    pub results: BenchmarkReport,
}

pub async fn stop(State(state): State<AppState>) -> Result<Json<Stopped>, ApiError> {
    let (results, total) = state
        .benchmark
        .stop()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(Stopped {
        status: "completed",
        total_duration_ms: total.as_millis() as u64,
        results,
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<BenchmarkStatus> {
    Json(state.benchmark.status())
}

#[derive(Debug, Deserialize)]
pub struct AlgorithmParam {
    pub algorithm: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Switched {
    pub status: &'static str,
    pub current_algorithm: StrategyKind,
    pub message: String,
}

pub async fn switch(
    State(state): State<AppState>,
    Query(params): Query<AlgorithmParam>,
) -> Result<Json<Switched>, ApiError> {
    let Some(name) = params.algorithm else {
        return Err(ApiError::bad_request("Query parameter 'algorithm' is required"));
    };
    let kind = parse_algorithm(&name)?;

    state.selector.switch(kind);
    state.benchmark.switch(kind);
    tracing::info!(strategy = %kind, "Benchmark switched algorithm");

    Ok(Json(Switched {
        status: "switched",
        current_algorithm: kind,
        message: format!("Successfully switched to {kind}"),
    }))
}

#[derive(Serialize)]
pub struct Reset {
    pub status: &'static str,
    pub algorithm: StrategyKind,
    pub message: String,
}

pub async fn reset(
    State(state): State<AppState>,
    Query(params): Query<AlgorithmParam>,
) -> Result<Json<Reset>, ApiError> {
    let kind = match params.algorithm.as_deref() {
        Some(name) => parse_algorithm(name)?,
        None => state
            .benchmark
            .current()
            .unwrap_or_else(|| state.selector.current()),
    };

    state.benchmark.reset(kind);
    tracing::info!(strategy = %kind, "Benchmark metrics reset");

    Ok(Json(Reset {
        status: "reset",
        algorithm: kind,
        message: format!("Successfully reset metrics for {kind}"),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Results {
    pub benchmark_active: bool,
    pub results: BenchmarkReport,
}

pub async fn results(State(state): State<AppState>) -> Json<Results> {
    Json(Results {
        benchmark_active: state.benchmark.is_active(),
        results: state.benchmark.report(),
    })
}
