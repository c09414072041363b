//! Registry and metrics administration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::http::server::AppState;
use crate::observability::metrics::InstanceMetrics;
use crate::registry::{derive_instance_id, RegistryStatus, ServiceView};

/// JSON `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, what)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAck {
    pub message: &'static str,
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

pub async fn register_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Json<ServiceAck> {
    state.registry.register(&service);
    tracing::info!(service = %service, "Service registered");
    Json(ServiceAck {
        message: "Service registered successfully",
        service_name: service,
        url: None,
        instance_name: None,
        changed: None,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstance {
    pub url: Option<String>,
    pub health_url: Option<String>,
    pub instance_name: Option<String>,
}

pub async fn add_instance(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(body): Json<NewInstance>,
) -> Result<Json<ServiceAck>, ApiError> {
    let (Some(url), Some(health_url)) = (body.url, body.health_url) else {
        return Err(ApiError::bad_request(
            "Both 'url' and 'healthUrl' are required",
        ));
    };
    for (field, value) in [("url", &url), ("healthUrl", &health_url)] {
        match url::Url::parse(value) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => {
                return Err(ApiError::bad_request(format!(
                    "'{field}' must be an absolute http(s) URL"
                )))
            }
        }
    }

    let instance_name = body
        .instance_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| derive_instance_id(&service, &url));
    let added = state
        .registry
        .add_instance(&service, &url, &health_url, &instance_name);

    Ok(Json(ServiceAck {
        message: if added {
            "Instance added successfully"
        } else {
            "Instance already registered"
        },
        service_name: service,
        url: Some(url),
        instance_name: Some(instance_name),
        changed: Some(added),
    }))
}

#[derive(Debug, Deserialize)]
pub struct InstanceQuery {
    pub url: String,
}

pub async fn remove_instance(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> Json<ServiceAck> {
    let removed = state.registry.remove_instance(&service, &query.url);
    Json(ServiceAck {
        message: if removed {
            "Instance removed successfully"
        } else {
            "Instance was not registered"
        },
        service_name: service,
        url: Some(query.url),
        instance_name: None,
        changed: Some(removed),
    })
}

pub async fn list_services(State(state): State<AppState>) -> Json<Vec<ServiceView>> {
    Json(state.registry.list_all().iter().map(|s| s.view()).collect())
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<ServiceView>, ApiError> {
    state
        .registry
        .get(&service)
        .map(|s| Json(s.view()))
        .ok_or_else(|| ApiError::not_found(format!("Unknown service: {service}")))
}

#[derive(Serialize)]
pub struct OverallStatus {
    #[serde(flatten)]
    pub counts: RegistryStatus,
    pub services: Vec<ServiceView>,
}

pub async fn registry_status(State(state): State<AppState>) -> Json<OverallStatus> {
    Json(OverallStatus {
        counts: state.registry.status(),
        services: state.registry.list_all().iter().map(|s| s.view()).collect(),
    })
}

/// Recover an instance URL from its path segment.
///
/// Segments arrive percent-decoded. A value without a scheme separator uses
/// the legacy encoding where `_` stands for `/` and `-` for `:`.
pub fn decode_instance_url(segment: &str) -> String {
    if segment.contains("://") {
        segment.to_string()
    } else {
        segment.replace('_', "/").replace('-', ":")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub message: &'static str,
    pub service_name: String,
    pub instance_url: String,
    pub healthy: bool,
}

pub async fn force_health_check(
    State(state): State<AppState>,
    Path((service, segment)): Path<(String, String)>,
) -> Result<Json<HealthCheckResult>, ApiError> {
    let url = decode_instance_url(&segment);
    let healthy = state
        .health
        .force_check(&service, &url)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Unknown instance {url} of {service}")))?;

    Ok(Json(HealthCheckResult {
        message: "Health check triggered",
        service_name: service,
        instance_url: url,
        healthy,
    }))
}

/// Per-instance snapshot keyed by instance name.
pub async fn service_metrics(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<BTreeMap<String, InstanceMetrics>>, ApiError> {
    let record = state
        .registry
        .get(&service)
        .ok_or_else(|| ApiError::not_found(format!("Unknown service: {service}")))?;

    let snapshot = record
        .instances()
        .iter()
        .map(|i| {
            (
                i.instance_id().to_string(),
                state.metrics.instance(&service, i.url()),
            )
        })
        .collect();
    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_both_url_forms() {
        assert_eq!(
            decode_instance_url("http://10.0.0.5:8080"),
            "http://10.0.0.5:8080"
        );
        assert_eq!(
            decode_instance_url("http-__10.0.0.5-8080"),
            "http://10.0.0.5:8080"
        );
    }
}
