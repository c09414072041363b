//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define balancer metrics (requests, latency, errors, RL decisions)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Keep a local per-instance snapshot for the admin API and the RL state encoder
//!
//! # Metrics
//! - `lb_proxy_requests_total` / `lb_proxy_request_duration_seconds` (service, status)
//! - `lb_proxy_errors_total` (service, reason, status)
//! - `lb_pod_requests_total`, `lb_pod_response_duration_seconds`, `lb_pod_errors_total`
//! - `lb_active_connections` (held by `ActiveConnection`), `lb_instance_health`
//! - `rl_decisions_total`, `rl_decision_duration_seconds`, `rl_fallback_total`, `rl_agent_health`
//! - `rl_feedback_sent_total`, `rl_feedback_failed_total`
//! - `rl_experience_sent_total`, `rl_experience_failed_total` (reason)
//! - `lb_discovery_sync_total` (outcome)

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::registry::{RegistryObserver, ServiceInstance};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a proxied request at the gateway level.
pub fn record_proxy_request(service: &str, status: u16, elapsed: Duration) {
    let labels = [
        ("service", service.to_string()),
        ("status", status.to_string()),
    ];
    counter!("lb_proxy_requests_total", &labels).increment(1);
    histogram!("lb_proxy_request_duration_seconds", &labels).record(elapsed.as_secs_f64());
}

pub fn record_proxy_error(service: &str, reason: &'static str, status: u16) {
    counter!(
        "lb_proxy_errors_total",
        "service" => service.to_string(),
        "reason" => reason,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_instance_request(service: &str, instance: &str, status: u16, elapsed: Duration) {
    counter!(
        "lb_pod_requests_total",
        "service" => service.to_string(),
        "instance" => instance.to_string()
    )
    .increment(1);
    histogram!(
        "lb_pod_response_duration_seconds",
        "service" => service.to_string(),
        "instance" => instance.to_string(),
        "status" => status.to_string()
    )
    .record(elapsed.as_secs_f64());
    if status >= 400 {
        counter!(
            "lb_pod_errors_total",
            "service" => service.to_string(),
            "instance" => instance.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
    }
}

pub fn record_instance_health(service: &str, instance: &str, healthy: bool) {
    gauge!(
        "lb_instance_health",
        "service" => service.to_string(),
        "instance" => instance.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// One in-flight downstream call, counted in `lb_active_connections` until dropped.
///
/// Dropping covers cancellation too: when the caller disconnects and the
/// handler future is dropped mid-call, the count still goes down.
#[derive(Debug)]
pub struct ActiveConnection {
    active: Arc<AtomicU64>,
}

impl ActiveConnection {
    fn open(active: Arc<AtomicU64>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        gauge!("lb_active_connections").increment(1.0);
        Self { active }
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        gauge!("lb_active_connections").decrement(1.0);
    }
}

pub fn record_rl_decision(service: &str, decision_type: &str, elapsed: Duration) {
    counter!(
        "rl_decisions_total",
        "service" => service.to_string(),
        "decision_type" => decision_type.to_string()
    )
    .increment(1);
    histogram!("rl_decision_duration_seconds", "service" => service.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_rl_fallback(service: &str, reason: &'static str) {
    counter!(
        "rl_fallback_total",
        "service" => service.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn set_rl_agent_health(healthy: bool) {
    gauge!("rl_agent_health").set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_feedback_sent(service: &str, instance: &str) {
    counter!(
        "rl_feedback_sent_total",
        "service" => service.to_string(),
        "instance" => instance.to_string()
    )
    .increment(1);
}

pub fn record_feedback_failed(service: &str, reason: &'static str) {
    counter!(
        "rl_feedback_failed_total",
        "service" => service.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_experience_sent() {
    counter!("rl_experience_sent_total").increment(1);
}

pub fn record_experience_failed(reason: &'static str) {
    counter!("rl_experience_failed_total", "reason" => reason).increment(1);
}

pub fn record_discovery_sync(outcome: &'static str) {
    counter!("lb_discovery_sync_total", "outcome" => outcome).increment(1);
}

#[derive(Debug)]
struct InstanceStats {
    instance_id: String,
    first_seen: Instant,
    requests: AtomicU64,
    errors: AtomicU64,
    total_latency_ms: AtomicU64,
    last_latency_ms: AtomicU64,
}

impl InstanceStats {
    fn new(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            first_seen: Instant::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            last_latency_ms: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> InstanceMetrics {
        let requests = self.requests.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let elapsed = self.first_seen.elapsed().as_secs_f64().max(1.0);

        let (avg, error_rate) = if requests == 0 {
            (0.0, 0.0)
        } else {
            (
                total as f64 / requests as f64,
                errors as f64 * 100.0 / requests as f64,
            )
        };

        InstanceMetrics {
            request_count: requests,
            error_count: errors,
            avg_response_time_ms: avg,
            last_response_time_ms: self.last_latency_ms.load(Ordering::Relaxed),
            error_rate_percent: error_rate,
            request_rate_per_second: requests as f64 / elapsed,
        }
    }
}

/// Point-in-time metrics of one instance, as seen by the balancer.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_response_time_ms: f64,
    pub last_response_time_ms: u64,
    pub error_rate_percent: f64,
    pub request_rate_per_second: f64,
}

/// Records proxied outcomes both to the exporter and to a local snapshot.
#[derive(Debug, Default)]
pub struct MetricsSink {
    /// Keyed by `(service, url)`.
    instances: DashMap<(String, String), InstanceStats>,
    active: Arc<AtomicU64>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a downstream call as in flight for as long as the guard lives.
    pub fn open_connection(&self) -> ActiveConnection {
        ActiveConnection::open(self.active.clone())
    }

    pub fn active_connections(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Record the outcome of a forwarded request.
    pub fn record(&self, instance: &ServiceInstance, status: u16, latency: Duration) {
        record_instance_request(
            instance.service_name(),
            instance.instance_id(),
            status,
            latency,
        );

        let key = (
            instance.service_name().to_string(),
            instance.url().to_string(),
        );
        let stats = self
            .instances
            .entry(key)
            .or_insert_with(|| InstanceStats::new(instance.instance_id()));

        let latency_ms = latency.as_millis() as u64;
        stats.requests.fetch_add(1, Ordering::Relaxed);
        stats.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        stats.last_latency_ms.store(latency_ms, Ordering::Relaxed);
        if status >= 400 {
            stats.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of one instance; zeroed when nothing was recorded yet.
    pub fn instance(&self, service: &str, url: &str) -> InstanceMetrics {
        self.instances
            .get(&(service.to_string(), url.to_string()))
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    /// Snapshots of every recorded instance of a service, keyed by instance id.
    pub fn service(&self, service: &str) -> BTreeMap<String, InstanceMetrics> {
        self.instances
            .iter()
            .filter(|e| e.key().0 == service)
            .map(|e| (e.value().instance_id.clone(), e.value().snapshot()))
            .collect()
    }
}

impl RegistryObserver for MetricsSink {
    fn instance_removed(&self, service_name: &str, url: &str) {
        self.instances
            .remove(&(service_name.to_string(), url.to_string()));
    }
}
