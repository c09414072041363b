//! Round-robin load balancing strategy.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{
    DecisionSource, RoutingContext, RoutingStrategy, Selection, StrategyKind,
};
use crate::registry::ServiceInstance;

/// Round-robin selector.
/// Keeps one cursor per service and rotates through its healthy instances.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the service's cursor and pick from `healthy`.
    pub fn next_instance(
        &self,
        service_name: &str,
        healthy: &[Arc<ServiceInstance>],
    ) -> Option<Arc<ServiceInstance>> {
        if healthy.is_empty() {
            return None;
        }

        let cursor = match self.cursors.get(service_name) {
            Some(c) => c.fetch_add(1, Ordering::Relaxed),
            None => self
                .cursors
                .entry(service_name.to_string())
                .or_default()
                .fetch_add(1, Ordering::Relaxed),
        };

        Some(healthy[cursor % healthy.len()].clone())
    }
}

#[async_trait]
impl RoutingStrategy for RoundRobin {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }

    async fn select(
        &self,
        ctx: &RoutingContext,
        healthy: &[Arc<ServiceInstance>],
    ) -> Option<Selection> {
        let instance = self.next_instance(&ctx.service_name, healthy)?;
        Some(Selection::new(
            &instance,
            StrategyKind::RoundRobin,
            DecisionSource::Algorithm,
        ))
    }

    fn stats(&self) -> serde_json::Value {
        let cursors: serde_json::Map<String, serde_json::Value> = self
            .cursors
            .iter()
            .map(|c| (c.key().clone(), c.value().load(Ordering::Relaxed).into()))
            .collect();
        serde_json::json!({ "cursors": cursors })
    }

    fn reset_stats(&self) {
        self.cursors.clear();
    }
}
