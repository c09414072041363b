//! The `/proxy/{service}/**` forwarder.
//!
//! # Per-request flow
//! ```text
//! ROUTING     trace id, body buffered, StrategySelector::select
//!     ├─ none      → 503 {"error": "No healthy instances available for service: <name>"}
//! FORWARDING  downstream URI, sanitized headers, bounded call
//!     ├─ Ok        → downstream status, headers and body passed through
//!     └─ Err       → 502 {"error": "Failed to forward request: <reason>"}
//! ```
//! Both terminal states record metrics and benchmark outcomes. rl-based
//! selections also queue feedback, and every routed request queues a
//! training experience when the collector is enabled. No retries happen here.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Path, State},
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::http::headers::{forwardable_request_headers, returnable_response_headers};
use crate::http::server::AppState;
use crate::http::trace::TraceId;
use crate::http::uri;
use crate::load_balancer::{RoutingContext, Selection, StrategyKind};
use crate::observability::metrics;
use crate::registry::instance::unix_millis;
use crate::rl::{reward_for_status, Experience, ExperienceMetadata, FeedbackRecord, StateSnapshot};

/// Status reported for requests that never got a downstream response.
pub const GATEWAY_ERROR_STATUS: u16 = 502;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid downstream URI: {0}")]
    InvalidUri(#[from] axum::http::uri::InvalidUri),
    #[error("invalid downstream request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("{0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("downstream did not answer within {0:?}")]
    Timeout(Duration),
    #[error("failed to read downstream body: {0}")]
    Body(#[source] axum::Error),
}

impl ProxyError {
    /// Label for `lb_proxy_errors_total`.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::InvalidUri(_) | ProxyError::Request(_) => "invalid_request",
            ProxyError::Transport(_) => "request_forwarding_failed",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::Body(_) => "response_body",
        }
    }
}

/// Buffered downstream answer.
struct Downstream {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

pub async fn proxy_handler(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let service = params.get("service").cloned().unwrap_or_default();
    let trace = TraceId::from_headers(request.headers(), state.trace_header.as_str());
    let settings = &state.config.proxy;

    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, settings.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(service = %service, trace_id = %trace, error = %e, "Request body rejected");
            metrics::record_proxy_error(&service, "payload_too_large", 413);
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Request body exceeds {} bytes", settings.max_body_bytes),
                &state.trace_header,
                &trace,
            );
        }
    };

    let path = uri::downstream_path(parts.uri.path(), &settings.route_prefix);
    let ctx = RoutingContext::new(&service, &path, parts.method.as_str());

    let decision_started = Instant::now();
    let active = state.selector.current();
    let Some(selection) = state.selector.select(&ctx).await else {
        tracing::debug!(service = %service, trace_id = %trace, "No healthy instances");
        metrics::record_proxy_error(&service, "no_healthy_instances", 503);
        metrics::record_proxy_request(&service, 503, started.elapsed());
        state.benchmark.record(active, &path, started.elapsed(), 503);
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("No healthy instances available for service: {service}"),
            &state.trace_header,
            &trace,
        );
    };

    let instance = selection.instance().clone();
    tracing::debug!(
        service = %service,
        strategy = %selection.strategy,
        instance = %instance.instance_id(),
        decision_ms = decision_started.elapsed().as_millis() as u64,
        trace_id = %trace,
        "Routing decision"
    );

    let before = state
        .experience
        .is_enabled()
        .then(|| snapshot(&state, &service));

    let connection = state.metrics.open_connection();
    let result = forward(&state, instance.url(), &path, &parts, body, &trace).await;
    drop(connection);
    let elapsed = started.elapsed();

    match result {
        Ok(downstream) => {
            let status = downstream.status.as_u16();
            tracing::info!(
                service = %service,
                instance = %instance.instance_id(),
                status,
                elapsed_ms = elapsed.as_millis() as u64,
                trace_id = %trace,
                "Request forwarded"
            );
            state.metrics.record(&instance, status, elapsed);
            metrics::record_proxy_request(&service, status, elapsed);
            report_outcome(&state, &selection, &path, status, elapsed, before);

            let mut headers = returnable_response_headers(&downstream.headers);
            set_trace_header(&mut headers, &state.trace_header, &trace);
            let mut response = Response::new(Body::from(downstream.body));
            *response.status_mut() = downstream.status;
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            tracing::error!(
                service = %service,
                instance = %instance.instance_id(),
                elapsed_ms = elapsed.as_millis() as u64,
                trace_id = %trace,
                error = %e,
                "Error forwarding request"
            );
            state.metrics.record(&instance, GATEWAY_ERROR_STATUS, elapsed);
            metrics::record_proxy_error(&service, e.reason(), GATEWAY_ERROR_STATUS);
            metrics::record_proxy_request(&service, GATEWAY_ERROR_STATUS, elapsed);
            report_outcome(&state, &selection, &path, GATEWAY_ERROR_STATUS, elapsed, before);

            error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to forward request: {e}"),
                &state.trace_header,
                &trace,
            )
        }
    }
}

async fn forward(
    state: &AppState,
    base_url: &str,
    path: &str,
    parts: &Parts,
    body: Bytes,
    trace: &TraceId,
) -> Result<Downstream, ProxyError> {
    let settings = &state.config.proxy;
    let query = uri::rebuild_query(parts.uri.query());
    let target = uri::target_uri(base_url, path, query.as_deref())?;
    tracing::debug!(uri = %target, "Forwarding request");

    let mut request = Request::builder()
        .method(parts.method.clone())
        .uri(target)
        .body(Body::from(body))?;
    let headers = request.headers_mut();
    *headers = forwardable_request_headers(&parts.headers);
    set_trace_header(headers, &state.trace_header, trace);

    let timeout = settings.timeout();
    let call = async {
        let response: Response<hyper::body::Incoming> = state.client.request(request).await?;
        let (head, body) = response.into_parts();
        let body = to_bytes(Body::new(body), settings.max_response_bytes)
            .await
            .map_err(ProxyError::Body)?;
        Ok::<_, ProxyError>(Downstream {
            status: head.status,
            headers: head.headers,
            body,
        })
    };

    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ProxyError::Timeout(timeout))?
}

fn snapshot(state: &AppState, service: &str) -> StateSnapshot {
    StateSnapshot {
        timestamp: unix_millis(),
        metrics: state.metrics.service(service),
    }
}

/// Hand a routed outcome to the benchmark, the RL feedback queue and the
/// experience collector.
///
/// Feedback only goes out when the RL service made (or fell back from) the decision.
fn report_outcome(
    state: &AppState,
    selection: &Selection,
    path: &str,
    status: u16,
    elapsed: Duration,
    before: Option<StateSnapshot>,
) {
    let instance = selection.instance();
    let response_time_ms = elapsed.as_secs_f64() * 1000.0;
    state
        .benchmark
        .record(selection.strategy, path, elapsed, status);

    if selection.strategy == StrategyKind::RlRemote {
        state.feedback.report(FeedbackRecord {
            service_name: instance.service_name().to_string(),
            selected_pod: instance.instance_id().to_string(),
            response_time_ms,
            status_code: status,
            error_occurred: status >= 400,
        });
    }

    if let Some(before) = before {
        state.experience.log(Experience {
            state: before,
            action: instance.instance_id().to_string(),
            reward: reward_for_status(status),
            next_state: snapshot(state, instance.service_name()),
            metadata: ExperienceMetadata {
                service: instance.service_name().to_string(),
                path: path.to_string(),
                status,
                strategy: selection.strategy.to_string(),
                response_time_ms,
            },
        });
    }
}

fn set_trace_header(headers: &mut HeaderMap, name: &HeaderName, trace: &TraceId) {
    if let Ok(value) = HeaderValue::from_str(trace.as_str()) {
        headers.insert(name.clone(), value);
    }
}

fn error_response(
    status: StatusCode,
    message: String,
    trace_header: &HeaderName,
    trace: &TraceId,
) -> Response {
    let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
    set_trace_header(response.headers_mut(), trace_header, trace);
    response
}
