//! Q-table driven routing from a locally loaded model.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::load_balancer::{
    round_robin::RoundRobin, DecisionSource, RoutingContext, RoutingStrategy, Selection,
    StrategyKind,
};
use crate::registry::ServiceInstance;
use crate::rl::{ModelError, ModelStats, ModelStore, StateEncoder};

/// Picks the highest-valued healthy instance for the current state.
///
/// Falls back to round-robin when no model is loaded or the state is unmapped.
pub struct RlStatic {
    model: Arc<ModelStore>,
    encoder: StateEncoder,
    fallback: Arc<RoundRobin>,
    total: AtomicU64,
    model_decisions: AtomicU64,
    fallbacks: AtomicU64,
}

impl RlStatic {
    pub fn new(model: Arc<ModelStore>, encoder: StateEncoder, fallback: Arc<RoundRobin>) -> Self {
        Self {
            model,
            encoder,
            fallback,
            total: AtomicU64::new(0),
            model_decisions: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
        }
    }

    pub fn reload(&self) -> Result<(), ModelError> {
        self.model.reload().map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_ready()
    }

    pub fn model_stats(&self) -> ModelStats {
        self.model.stats()
    }

    fn fall_back(
        &self,
        ctx: &RoutingContext,
        healthy: &[Arc<ServiceInstance>],
        reason: &'static str,
    ) -> Option<Selection> {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(service = %ctx.service_name, reason, "Static RL fallback");
        let instance = self.fallback.next_instance(&ctx.service_name, healthy)?;
        Some(Selection::new(
            &instance,
            StrategyKind::RlStatic,
            DecisionSource::Fallback(reason),
        ))
    }
}

#[async_trait]
impl RoutingStrategy for RlStatic {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RlStatic
    }

    async fn select(
        &self,
        ctx: &RoutingContext,
        healthy: &[Arc<ServiceInstance>],
    ) -> Option<Selection> {
        if healthy.is_empty() {
            return None;
        }
        self.total.fetch_add(1, Ordering::Relaxed);

        let Some(model) = self.model.current() else {
            return self.fall_back(ctx, healthy, "model_not_loaded");
        };

        let state = self.encoder.encode(healthy);
        let best = model
            .best_instance(&state, |pod| healthy.iter().any(|i| i.instance_id() == pod))
            .and_then(|pod| healthy.iter().find(|i| i.instance_id() == pod));

        match best {
            Some(instance) => {
                self.model_decisions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    service = %ctx.service_name,
                    state = %state,
                    instance = %instance.instance_id(),
                    "Static RL decision"
                );
                Some(Selection::new(
                    instance,
                    StrategyKind::RlStatic,
                    DecisionSource::Model,
                ))
            }
            None => self.fall_back(ctx, healthy, "state_not_mapped"),
        }
    }

    fn stats(&self) -> serde_json::Value {
        let total = self.total.load(Ordering::Relaxed);
        let rl = self.model_decisions.load(Ordering::Relaxed);
        let model = self.model.stats();
        serde_json::json!({
            "totalDecisions": total,
            "rlDecisions": rl,
            "fallbackDecisions": self.fallbacks.load(Ordering::Relaxed),
            "rlSuccessRate": if total > 0 { rl as f64 / total as f64 } else { 0.0 },
            "fallbackEnabled": true,
            "rlModelsReady": model.loaded,
            "rlModelError": model.error,
        })
    }

    fn reset_stats(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.model_decisions.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{ctx, instances};
    use crate::observability::metrics::MetricsSink;
    use crate::rl::RlModel;
    use std::collections::{BTreeMap, HashMap};

    fn strategy(model: Option<RlModel>) -> RlStatic {
        let store = Arc::new(ModelStore::new(None));
        if let Some(model) = model {
            store.install(model);
        }
        RlStatic::new(
            store,
            StateEncoder::new(Arc::new(MetricsSink::new())),
            Arc::new(RoundRobin::new()),
        )
    }

    fn model() -> RlModel {
        let actions = BTreeMap::from([("svc-0".to_string(), 0), ("svc-1".to_string(), 1)]);
        let q_table = HashMap::from([(
            "2:0:0".to_string(),
            BTreeMap::from([("svc-0".to_string(), 0.1), ("svc-1".to_string(), 0.7)]),
        )]);
        RlModel::new(actions, q_table)
    }

    #[tokio::test]
    async fn follows_the_q_table() {
        let lb = strategy(Some(model()));
        let backends = instances(&["http://a:1", "http://b:1"]);

        for _ in 0..3 {
            let s = lb.select(&ctx(), &backends).await.unwrap();
            assert_eq!(s.instance().instance_id(), "svc-1");
            assert_eq!(s.source, DecisionSource::Model);
        }
        assert_eq!(lb.stats()["rlDecisions"], 3);
    }

    #[tokio::test]
    async fn unmapped_state_rotates() {
        let lb = strategy(Some(model()));
        let backends = instances(&["http://a:1", "http://b:1", "http://c:1"]);

        let s = lb.select(&ctx(), &backends).await.unwrap();
        assert_eq!(s.source, DecisionSource::Fallback("state_not_mapped"));
        assert_eq!(s.instance().url(), "http://a:1");
    }

    #[tokio::test]
    async fn best_instance_must_be_healthy() {
        let lb = strategy(Some(model()));
        // svc-1 is missing from the healthy list; state "1:0:0" is unmapped anyway,
        // so the fallback picks the only healthy one.
        let backends = instances(&["http://a:1"]);
        let s = lb.select(&ctx(), &backends).await.unwrap();
        assert_eq!(s.instance().instance_id(), "svc-0");
    }

    #[tokio::test]
    async fn no_model_falls_back_and_resets() {
        let lb = strategy(None);
        let backends = instances(&["http://a:1", "http://b:1"]);

        let s = lb.select(&ctx(), &backends).await.unwrap();
        assert_eq!(s.source, DecisionSource::Fallback("model_not_loaded"));
        assert!(lb.select(&ctx(), &[]).await.is_none());

        assert_eq!(lb.stats()["fallbackDecisions"], 1);
        lb.reset_stats();
        assert_eq!(lb.stats()["totalDecisions"], 0);
    }
}
