//! Least Connections load balancing strategy.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

use crate::load_balancer::{
    DecisionSource, RoutingContext, RoutingStrategy, Selection, StrategyKind,
};
use crate::registry::ServiceInstance;

/// Least connections selector.
/// Selects the healthy instance with the fewest in-flight requests.
///
/// The scan and the increment happen under one lock so two concurrent
/// selections observe each other.
#[derive(Debug, Default)]
pub struct LeastConnections {
    select_lock: Mutex<()>,
}

impl LeastConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pick(&self, healthy: &[Arc<ServiceInstance>], source: DecisionSource) -> Option<Selection> {
        let _held = self
            .select_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // In case of tie, the first one is selected (stability)
        let instance = healthy.iter().min_by_key(|i| i.active_connections())?;
        Some(Selection::new(instance, StrategyKind::LeastConnections, source))
    }
}

#[async_trait]
impl RoutingStrategy for LeastConnections {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LeastConnections
    }

    async fn select(
        &self,
        _ctx: &RoutingContext,
        healthy: &[Arc<ServiceInstance>],
    ) -> Option<Selection> {
        self.pick(healthy, DecisionSource::Algorithm)
    }
}
