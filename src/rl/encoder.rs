//! State encoding for the static RL model.
//!
//! A state is `"<healthy_count>:<latency_bin>:<error_bin>"`, computed from the
//! balancer's own per-instance snapshot of the healthy instances.

use std::sync::Arc;

use crate::observability::metrics::MetricsSink;
use crate::registry::ServiceInstance;

const MAX_HEALTHY: usize = 10;

pub struct StateEncoder {
    metrics: Arc<MetricsSink>,
}

impl StateEncoder {
    pub fn new(metrics: Arc<MetricsSink>) -> Self {
        Self { metrics }
    }

    pub fn encode(&self, healthy: &[Arc<ServiceInstance>]) -> String {
        let mut requests = 0u64;
        let mut errors = 0u64;
        let mut weighted_latency = 0.0;

        for instance in healthy {
            let m = self
                .metrics
                .instance(instance.service_name(), instance.url());
            requests += m.request_count;
            errors += m.error_count;
            weighted_latency += m.avg_response_time_ms * m.request_count as f64;
        }

        let (latency_ms, error_pct) = if requests == 0 {
            (0.0, 0.0)
        } else {
            (
                weighted_latency / requests as f64,
                errors as f64 * 100.0 / requests as f64,
            )
        };

        format!(
            "{}:{}:{}",
            healthy.len().min(MAX_HEALTHY),
            latency_bin(latency_ms),
            error_bin(error_pct)
        )
    }
}

fn latency_bin(ms: f64) -> u8 {
    match ms {
        x if x < 50.0 => 0,
        x if x < 200.0 => 1,
        x if x < 1000.0 => 2,
        _ => 3,
    }
}

fn error_bin(percent: f64) -> u8 {
    match percent {
        x if x < 1.0 => 0,
        x if x < 5.0 => 1,
        x if x < 20.0 => 2,
        _ => 3,
    }
}
