//! RL subsystem introspection and control.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::admin::handlers::ApiError;
use crate::http::server::AppState;
use crate::load_balancer::{RoutingStrategy, StrategyKind};
use crate::rl::{ModelError, ModelStats};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RlStatus {
    pub current_strategy: StrategyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_stats: Option<serde_json::Value>,
    pub rl_api_health: bool,
    pub model_stats: ModelStats,
    /// Learning statistics reported by the RL service, when rl-based is active and reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rl_service_stats: Option<serde_json::Value>,
}

pub async fn status(State(state): State<AppState>) -> Json<RlStatus> {
    let current = state.selector.current();
    let rl_remote = state.selector.rl_remote();

    let (routing_type, routing_stats) = match current {
        StrategyKind::RlRemote => (Some("api-based"), Some(rl_remote.stats())),
        StrategyKind::RlStatic => (Some("static-model"), Some(state.selector.rl_static().stats())),
        _ => (None, None),
    };

    let rl_service_stats = if current == StrategyKind::RlRemote {
        match rl_remote.client().stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::debug!(error = %e, "RL service stats unavailable");
                None
            }
        }
    } else {
        None
    };

    Json(RlStatus {
        current_strategy: current,
        routing_type,
        routing_stats,
        rl_api_health: rl_remote.is_api_healthy(),
        model_stats: state.models.stats(),
        rl_service_stats,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadOutcome {
    pub status: &'static str,
    pub message: &'static str,
    pub model_stats: ModelStats,
}

pub async fn reload(State(state): State<AppState>) -> Result<Json<ReloadOutcome>, ApiError> {
    tracing::info!("Manual RL model reload requested");
    match state.models.reload() {
        Ok(_) => Ok(Json(ReloadOutcome {
            status: "success",
            message: "RL models reloaded successfully",
            model_stats: state.models.stats(),
        })),
        Err(e @ ModelError::NotConfigured) => Err(ApiError::bad_request(e.to_string())),
        Err(e) => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to reload models: {e}"),
        )),
    }
}

#[derive(Serialize)]
pub struct Message {
    pub status: &'static str,
    pub message: &'static str,
}

pub async fn reset_stats(State(state): State<AppState>) -> Json<Message> {
    state.selector.reset_rl_stats();
    tracing::info!("RL routing statistics reset");
    Json(Message {
        status: "success",
        message: "RL routing statistics reset",
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategies {
    pub current: StrategyKind,
    pub available: Vec<StrategyKind>,
    pub aliases: BTreeMap<&'static str, StrategyKind>,
    pub rl_models_ready: bool,
    pub rl_api_healthy: bool,
    pub rl_implementations: BTreeMap<StrategyKind, &'static str>,
    pub stats: crate::load_balancer::selector::StrategyStats,
}

pub async fn strategies(State(state): State<AppState>) -> Json<Strategies> {
    Json(Strategies {
        current: state.selector.current(),
        available: StrategyKind::ALL.to_vec(),
        aliases: BTreeMap::from([("connection-aware", StrategyKind::LeastConnections)]),
        rl_models_ready: state.models.is_ready(),
        rl_api_healthy: state.selector.rl_remote().is_api_healthy(),
        rl_implementations: BTreeMap::from([
            (StrategyKind::RlRemote, "API-based RL with external RL service"),
            (StrategyKind::RlStatic, "Static Q-table based RL"),
        ]),
        stats: state.selector.stats(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub strategy: String,
}

#[derive(Serialize)]
pub struct SwitchOutcome {
    pub previous: StrategyKind,
    pub current: StrategyKind,
}

pub async fn switch_strategy(
    State(state): State<AppState>,
    Json(body): Json<SwitchRequest>,
) -> Result<Json<SwitchOutcome>, ApiError> {
    let kind: StrategyKind = body
        .strategy
        .parse()
        .map_err(|e: crate::load_balancer::UnknownStrategy| ApiError::bad_request(e.to_string()))?;
    let previous = state.selector.switch(kind);
    if state.benchmark.is_active() {
        state.benchmark.switch(kind);
    }
    Ok(Json(SwitchOutcome {
        previous,
        current: kind,
    }))
}
