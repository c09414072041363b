//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files, and
//! every section carries defaults so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Proxy entry point settings.
    pub proxy: ProxySettings,

    /// Initial routing strategy.
    pub routing: RoutingConfig,

    /// Discovery store and reconciliation settings.
    pub discovery: DiscoveryConfig,

    /// Active health probing settings.
    pub health_check: HealthCheckConfig,

    /// External RL decision service.
    pub rl_remote: RlRemoteConfig,

    /// Locally loaded RL model.
    pub rl_static: RlStaticConfig,

    /// Experience collector for offline training.
    pub collector: CollectorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin surface settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Settings for the `/proxy/{service}/**` entry point.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Path prefix that precedes the service name segment.
    pub route_prefix: String,

    /// Downstream call timeout in milliseconds.
    pub timeout_ms: u64,

    /// Maximum buffered request body size in bytes.
    pub max_body_bytes: usize,

    /// Maximum buffered downstream response body size in bytes.
    pub max_response_bytes: usize,

    /// Correlation header propagated downstream and echoed to the caller.
    pub trace_header: String,
}

impl ProxySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            route_prefix: "/proxy".to_string(),
            timeout_ms: 30_000,
            max_body_bytes: 10 * 1024 * 1024,
            max_response_bytes: 100 * 1024 * 1024,
            trace_header: "X-Trace-Id".to_string(),
        }
    }
}

/// Routing strategy selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// One of `round-robin`, `least-connections`, `rl-based`, `rl-static`.
    pub strategy: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: "round-robin".to_string(),
        }
    }
}

/// Discovery store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Enable periodic reconciliation against the store.
    pub enabled: bool,

    /// Redis connection URL.
    pub redis_url: String,

    /// Key prefix of instance records (`service:<name>:<instanceId>`).
    pub key_prefix: String,

    /// Reconciliation interval in seconds.
    pub sync_interval_secs: u64,

    /// Timeout for a single store round-trip in milliseconds.
    pub timeout_ms: u64,
}

impl DiscoveryConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "service:".to_string(),
            sync_interval_secs: 15,
            timeout_ms: 2_000,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in milliseconds.
    pub timeout_ms: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
            timeout_ms: 2_000,
        }
    }
}

/// External RL decision service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RlRemoteConfig {
    /// Base URL of the decision API.
    pub base_url: String,

    /// Budget for a single `/decide` call in milliseconds.
    pub decision_timeout_ms: u64,

    /// Budget for a single `/feedback` or `/health` call in milliseconds.
    pub feedback_timeout_ms: u64,

    /// Interval of the background `/health` probe in seconds.
    pub health_interval_secs: u64,

    /// Deterministic strategy used when the remote decision is unavailable.
    pub fallback: String,

    /// Capacity of the feedback delivery queue.
    pub feedback_queue_size: usize,
}

impl RlRemoteConfig {
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }

    pub fn feedback_timeout(&self) -> Duration {
        Duration::from_millis(self.feedback_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}

impl Default for RlRemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8088".to_string(),
            decision_timeout_ms: 300,
            feedback_timeout_ms: 2_000,
            health_interval_secs: 5,
            fallback: "round-robin".to_string(),
            feedback_queue_size: 1024,
        }
    }
}

/// Static RL model configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RlStaticConfig {
    /// Directory holding `action_mappings.json` and `q_table.json`.
    pub model_dir: Option<String>,

    /// Reload the model when files in `model_dir` change.
    pub watch: bool,
}

impl Default for RlStaticConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            watch: true,
        }
    }
}

/// Experience collector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Send one experience per proxied request.
    pub enabled: bool,

    /// Base URL of the collector; records go to `{endpoint_url}/experience`.
    pub endpoint_url: String,

    /// Budget for a single delivery in milliseconds.
    pub timeout_ms: u64,

    /// Capacity of the delivery queue.
    pub queue_size: usize,
}

impl CollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint_url: "http://localhost:8000".to_string(),
            timeout_ms: 2_000,
            queue_size: 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer key required on `/api/*` and `/rl/*` when set.
    pub api_key: Option<String>,
}
