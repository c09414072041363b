//! Active strategy holder.
//!
//! All four strategies are built once and live for the whole process; a
//! switch only swaps which one serves new selections, so strategy-local
//! state survives switching away and back.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;

use crate::load_balancer::{
    LeastConnections, RlRemote, RlStatic, RoundRobin, RoutingContext, RoutingStrategy, Selection,
    StrategyKind,
};
use crate::registry::InstanceRegistry;

/// Introspection of every strategy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStats {
    pub current: StrategyKind,
    pub round_robin: serde_json::Value,
    pub least_connections: serde_json::Value,
    pub rl_based: serde_json::Value,
    pub rl_static: serde_json::Value,
}

pub struct StrategySelector {
    registry: Arc<InstanceRegistry>,
    active: ArcSwap<StrategyKind>,
    round_robin: Arc<RoundRobin>,
    least_connections: Arc<LeastConnections>,
    rl_remote: Arc<RlRemote>,
    rl_static: Arc<RlStatic>,
}

impl StrategySelector {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        initial: StrategyKind,
        round_robin: Arc<RoundRobin>,
        least_connections: Arc<LeastConnections>,
        rl_remote: Arc<RlRemote>,
        rl_static: Arc<RlStatic>,
    ) -> Self {
        Self {
            registry,
            active: ArcSwap::from_pointee(initial),
            round_robin,
            least_connections,
            rl_remote,
            rl_static,
        }
    }

    pub fn current(&self) -> StrategyKind {
        **self.active.load()
    }

    /// Make `kind` the active strategy. Returns the previous one.
    pub fn switch(&self, kind: StrategyKind) -> StrategyKind {
        let previous = *self.active.swap(Arc::new(kind));
        if previous != kind {
            tracing::info!(from = %previous, to = %kind, "Routing strategy switched");
        }
        previous
    }

    pub fn strategy(&self, kind: StrategyKind) -> Arc<dyn RoutingStrategy> {
        match kind {
            StrategyKind::RoundRobin => self.round_robin.clone(),
            StrategyKind::LeastConnections => self.least_connections.clone(),
            StrategyKind::RlRemote => self.rl_remote.clone(),
            StrategyKind::RlStatic => self.rl_static.clone(),
        }
    }

    pub fn rl_remote(&self) -> &Arc<RlRemote> {
        &self.rl_remote
    }

    pub fn rl_static(&self) -> &Arc<RlStatic> {
        &self.rl_static
    }

    /// Select an instance of `ctx.service_name` with the active strategy.
    ///
    /// Returns `None` without consulting the strategy when the service has no
    /// healthy instance.
    pub async fn select(&self, ctx: &RoutingContext) -> Option<Selection> {
        let healthy = self.registry.healthy_instances(&ctx.service_name);
        if healthy.is_empty() {
            return None;
        }
        self.strategy(self.current()).select(ctx, &healthy).await
    }

    pub fn stats(&self) -> StrategyStats {
        StrategyStats {
            current: self.current(),
            round_robin: self.round_robin.stats(),
            least_connections: self.least_connections.stats(),
            rl_based: self.rl_remote.stats(),
            rl_static: self.rl_static.stats(),
        }
    }

    /// Reset the decision counters of the RL strategies.
    ///
    /// In-flight counts are live state, not statistics, and are left alone.
    pub fn reset_rl_stats(&self) {
        self.rl_remote.reset_stats();
        self.rl_static.reset_stats();
    }
}
