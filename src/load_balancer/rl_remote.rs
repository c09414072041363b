//! Routing delegated to the external RL decision service.
//!
//! # Fallback reasons
//! - `rl_api_unhealthy`: the service was last seen unhealthy, no call made
//! - `selected_pod_not_found`: the decision names no healthy instance
//! - `no_decision_returned`: the decision is empty
//! - `rl_decision_error`: timeout, non-2xx or transport failure

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time;

use crate::load_balancer::{
    DecisionSource, RoutingContext, RoutingStrategy, Selection, StrategyKind,
};
use crate::observability::metrics;
use crate::registry::instance::unix_millis;
use crate::registry::ServiceInstance;
use crate::rl::{DecisionRequest, RlDecisionClient};

pub struct RlRemote {
    client: Arc<RlDecisionClient>,
    fallback: Arc<dyn RoutingStrategy>,
    healthy: AtomicBool,
    last_health_check_ms: AtomicU64,
    total: AtomicU64,
    rl_decisions: AtomicU64,
    fallbacks: AtomicU64,
    fallback_reasons: DashMap<&'static str, u64>,
}

impl RlRemote {
    /// The service is assumed healthy until a call or probe says otherwise.
    pub fn new(client: Arc<RlDecisionClient>, fallback: Arc<dyn RoutingStrategy>) -> Self {
        Self {
            client,
            fallback,
            healthy: AtomicBool::new(true),
            last_health_check_ms: AtomicU64::new(0),
            total: AtomicU64::new(0),
            rl_decisions: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            fallback_reasons: DashMap::new(),
        }
    }

    pub fn client(&self) -> &Arc<RlDecisionClient> {
        &self.client
    }

    pub fn is_api_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn fallback_kind(&self) -> StrategyKind {
        self.fallback.kind()
    }

    fn set_health(&self, healthy: bool) {
        let previous = self.healthy.swap(healthy, Ordering::AcqRel);
        if previous != healthy {
            tracing::info!(
                healthy,
                url = %self.client.base_url(),
                "RL service health changed"
            );
            metrics::set_rl_agent_health(healthy);
        }
    }

    /// Probe `/health` once and update the health flag.
    pub async fn check_health(&self) -> bool {
        let healthy = match self.client.health().await {
            Ok(health) => health.is_healthy(),
            Err(e) => {
                tracing::debug!(error = %e, "RL service health probe failed");
                false
            }
        };
        self.last_health_check_ms.store(unix_millis(), Ordering::Relaxed);
        self.set_health(healthy);
        healthy
    }

    /// Periodic health monitor.
    pub async fn run_health_monitor(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_health().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("RL health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn fall_back(
        &self,
        ctx: &RoutingContext,
        healthy: &[Arc<ServiceInstance>],
        reason: &'static str,
    ) -> Option<Selection> {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        *self.fallback_reasons.entry(reason).or_insert(0) += 1;
        metrics::record_rl_fallback(&ctx.service_name, reason);

        let selection = self.fallback.select(ctx, healthy).await?;
        tracing::debug!(
            service = %ctx.service_name,
            reason,
            instance = %selection.instance().instance_id(),
            "RL fallback decision"
        );
        Some(selection.attributed_to(StrategyKind::RlRemote, DecisionSource::Fallback(reason)))
    }
}

#[async_trait]
impl RoutingStrategy for RlRemote {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RlRemote
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

        if !self.is_api_healthy() {
            return self.fall_back(ctx, healthy, "rl_api_unhealthy").await;
        }

        let request = DecisionRequest {
            service_name: ctx.service_name.clone(),
            request_path: ctx.path.clone(),
            request_method: ctx.method.clone(),
            available_pods: healthy.iter().map(|i| i.instance_id().to_string()).collect(),
        };

        let started = Instant::now();
        let decision = match self.client.decide(&request).await {
            Ok(decision) => {
                self.set_health(true);
                decision
            }
            Err(e) => {
                tracing::debug!(service = %ctx.service_name, error = %e, "RL decision failed");
                self.set_health(false);
                return self.fall_back(ctx, healthy, "rl_decision_error").await;
            }
        };

        let Some(pod) = decision.selected_pod.as_deref().filter(|p| !p.is_empty()) else {
            return self.fall_back(ctx, healthy, "no_decision_returned").await;
        };

        let Some(instance) = healthy.iter().find(|i| i.instance_id() == pod) else {
            tracing::warn!(service = %ctx.service_name, pod, "RL selected instance is not healthy or unknown");
            return self.fall_back(ctx, healthy, "selected_pod_not_found").await;
        };

        self.rl_decisions.fetch_add(1, Ordering::Relaxed);
        let decision_type = decision.decision_type.as_deref().unwrap_or("rl_decision");
        metrics::record_rl_decision(&ctx.service_name, decision_type, started.elapsed());
        tracing::debug!(
            service = %ctx.service_name,
            pod,
            confidence = decision.confidence,
            decision_type,
            "RL decision"
        );

        Some(Selection::new(instance, StrategyKind::RlRemote, DecisionSource::Model))
    }

    fn stats(&self) -> serde_json::Value {
        let total = self.total.load(Ordering::Relaxed);
        let rl = self.rl_decisions.load(Ordering::Relaxed);
        let reasons: serde_json::Map<String, serde_json::Value> = self
            .fallback_reasons
            .iter()
            .map(|r| (r.key().to_string(), (*r.value()).into()))
            .collect();
        let last_check = match self.last_health_check_ms.load(Ordering::Relaxed) {
            0 => serde_json::Value::Null,
            ms => ms.into(),
        };
        serde_json::json!({
            "totalDecisions": total,
            "rlDecisions": rl,
            "fallbackDecisions": self.fallbacks.load(Ordering::Relaxed),
            "rlSuccessRate": if total > 0 { rl as f64 / total as f64 } else { 0.0 },
            "rlApiHealthy": self.is_api_healthy(),
            "fallbackStrategy": self.fallback.kind().as_str(),
            "fallbackReasons": reasons,
            "lastHealthCheck": last_check,
        })
    }

    fn reset_stats(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.rl_decisions.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
        self.fallback_reasons.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RlRemoteConfig;
    use crate::load_balancer::round_robin::RoundRobin;
    use crate::load_balancer::test_support::{ctx, instances};
    use axum::{http::StatusCode, routing::{get, post}, Json, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn strategy(base_url: String, timeout_ms: u64) -> RlRemote {
        let client = Arc::new(RlDecisionClient::new(&RlRemoteConfig {
            base_url,
            decision_timeout_ms: timeout_ms,
            ..RlRemoteConfig::default()
        }));
        RlRemote::new(client, Arc::new(RoundRobin::new()))
    }

    #[tokio::test]
    async fn uses_remote_decision() {
        let url = serve(Router::new().route(
            "/decide",
            post(|Json(req): Json<Value>| async move {
                let pods = req["available_pods"].as_array().unwrap();
                Json(json!({
                    "selected_pod": pods.last().unwrap(),
                    "confidence": 0.93,
                    "decision_type": "exploit",
                }))
            }),
        ))
        .await;

        let lb = strategy(url, 300);
        let backends = instances(&["http://a:1", "http://b:1"]);
        let s = lb.select(&ctx(), &backends).await.unwrap();
        assert_eq!(s.instance().instance_id(), "svc-1");
        assert_eq!(s.source, DecisionSource::Model);
        assert_eq!(s.strategy, StrategyKind::RlRemote);
        assert_eq!(lb.stats()["rlDecisions"], 1);
    }

    #[tokio::test]
    async fn slow_service_falls_back_within_budget() {
        let url = serve(Router::new().route(
            "/decide",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"selected_pod": "svc-1"}))
            }),
        ))
        .await;

        let lb = strategy(url, 100);
        let backends = instances(&["http://a:1", "http://b:1"]);

        let started = Instant::now();
        let s = lb.select(&ctx(), &backends).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(s.source, DecisionSource::Fallback("rl_decision_error"));
        assert_eq!(s.strategy, StrategyKind::RlRemote);
        assert!(!lb.is_api_healthy());

        // Marked unhealthy: the next call skips the service entirely.
        let s = lb.select(&ctx(), &backends).await.unwrap();
        assert_eq!(s.source, DecisionSource::Fallback("rl_api_unhealthy"));
        assert_eq!(lb.stats()["fallbackReasons"]["rl_api_unhealthy"], 1);
    }

    #[tokio::test]
    async fn unknown_pod_and_empty_decision_fall_back() {
        let url = serve(Router::new().route(
            "/decide",
            post(|Json(req): Json<Value>| async move {
                if req["request_method"] == "POST" {
                    Json(json!({}))
                } else {
                    Json(json!({"selected_pod": "ghost"}))
                }
            }),
        ))
        .await;

        let lb = strategy(url, 300);
        let backends = instances(&["http://a:1"]);

        let s = lb.select(&ctx(), &backends).await.unwrap();
        assert_eq!(s.source, DecisionSource::Fallback("selected_pod_not_found"));

        let post_ctx = RoutingContext::new("svc", "/", "POST");
        let s = lb.select(&post_ctx, &backends).await.unwrap();
        assert_eq!(s.source, DecisionSource::Fallback("no_decision_returned"));
        assert!(lb.is_api_healthy());
    }

    #[tokio::test]
    async fn error_status_falls_back_and_health_probe_recovers() {
        let url = serve(
            Router::new()
                .route("/decide", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
                .route(
                    "/health",
                    get(|| async { Json(json!({"status": "healthy", "rl_agent_ready": true})) }),
                ),
        )
        .await;

        let lb = strategy(url, 300);
        let backends = instances(&["http://a:1"]);
        let s = lb.select(&ctx(), &backends).await.unwrap();
        assert_eq!(s.source, DecisionSource::Fallback("rl_decision_error"));
        assert!(!lb.is_api_healthy());

        assert!(lb.check_health().await);
        assert!(lb.is_api_healthy());
        assert!(lb.stats()["lastHealthCheck"].is_u64());
    }

    #[tokio::test]
    async fn unreachable_service_never_fails_selection() {
        let lb = strategy("http://127.0.0.1:1".to_string(), 200);
        let backends = instances(&["http://a:1", "http://b:1"]);
        for _ in 0..3 {
            assert!(lb.select(&ctx(), &backends).await.is_some());
        }
        assert!(lb.select(&ctx(), &[]).await.is_none());
    }
}
