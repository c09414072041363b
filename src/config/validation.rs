//! Configuration validation.
//!
//! Serde handles the syntactic side; this module checks value ranges, names
//! and addresses. Every problem is reported, not just the first one.

use std::net::SocketAddr;

use crate::config::schema::BalancerConfig;
use crate::load_balancer::StrategyKind;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if !config.proxy.route_prefix.starts_with('/') {
        errors.push(ValidationError::new(
            "proxy.route_prefix",
            "must start with '/'",
        ));
    }
    if config.proxy.timeout_ms == 0 {
        errors.push(ValidationError::new("proxy.timeout_ms", "must be > 0"));
    }
    if config.proxy.max_body_bytes == 0 {
        errors.push(ValidationError::new("proxy.max_body_bytes", "must be > 0"));
    }
    if config.proxy.max_response_bytes == 0 {
        errors.push(ValidationError::new(
            "proxy.max_response_bytes",
            "must be > 0",
        ));
    }
    if config.proxy.trace_header.trim().is_empty()
        || axum::http::HeaderName::from_bytes(config.proxy.trace_header.as_bytes()).is_err()
    {
        errors.push(ValidationError::new(
            "proxy.trace_header",
            "must be a valid header name",
        ));
    }

    if config.routing.strategy.parse::<StrategyKind>().is_err() {
        errors.push(ValidationError::new(
            "routing.strategy",
            format!("unknown strategy '{}'", config.routing.strategy),
        ));
    }

    if config.discovery.enabled {
        if config.discovery.sync_interval_secs == 0 {
            errors.push(ValidationError::new(
                "discovery.sync_interval_secs",
                "must be > 0",
            ));
        }
        if config.discovery.timeout_ms == 0 {
            errors.push(ValidationError::new("discovery.timeout_ms", "must be > 0"));
        }
        if url::Url::parse(&config.discovery.redis_url).is_err() {
            errors.push(ValidationError::new(
                "discovery.redis_url",
                format!("'{}' is not a URL", config.discovery.redis_url),
            ));
        }
    }

    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::new(
                "health_check.interval_secs",
                "must be > 0",
            ));
        }
        if config.health_check.timeout_ms == 0 {
            errors.push(ValidationError::new("health_check.timeout_ms", "must be > 0"));
        }
    }

    if url::Url::parse(&config.rl_remote.base_url).is_err() {
        errors.push(ValidationError::new(
            "rl_remote.base_url",
            format!("'{}' is not a URL", config.rl_remote.base_url),
        ));
    }
    if config.rl_remote.decision_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "rl_remote.decision_timeout_ms",
            "must be > 0",
        ));
    }
    if config.rl_remote.health_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rl_remote.health_interval_secs",
            "must be > 0",
        ));
    }
    if config.rl_remote.feedback_queue_size == 0 {
        errors.push(ValidationError::new(
            "rl_remote.feedback_queue_size",
            "must be > 0",
        ));
    }
    match config.rl_remote.fallback.parse::<StrategyKind>() {
        Ok(StrategyKind::RoundRobin) | Ok(StrategyKind::LeastConnections) => {}
        _ => errors.push(ValidationError::new(
            "rl_remote.fallback",
            "must be 'round-robin' or 'least-connections'",
        )),
    }

    if config.collector.enabled {
        if url::Url::parse(&config.collector.endpoint_url).is_err() {
            errors.push(ValidationError::new(
                "collector.endpoint_url",
                format!("'{}' is not a URL", config.collector.endpoint_url),
            ));
        }
        if config.collector.timeout_ms == 0 {
            errors.push(ValidationError::new("collector.timeout_ms", "must be > 0"));
        }
        if config.collector.queue_size == 0 {
            errors.push(ValidationError::new("collector.queue_size", "must be > 0"));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
