//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered instance's health URL
//! - Update registry health with tickets taken when each probe starts
//! - Serve on-demand forced probes for the admin API

use axum::body::Body;
use axum::http::Request;
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::observability::metrics;
use crate::registry::{InstanceRegistry, ServiceInstance};

pub struct HealthChecker {
    registry: Arc<InstanceRegistry>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthChecker {
    pub fn new(registry: Arc<InstanceRegistry>, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            registry,
            config,
            client,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_ms = self.config.timeout_ms,
            "Health checker starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health checker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered instance concurrently.
    pub async fn check_all(&self) {
        let instances = self.registry.all_instances();
        join_all(instances.iter().map(|i| self.check(i))).await;
    }

    /// Probe one instance now.
    ///
    /// Returns `None` when the instance is not registered.
    pub async fn force_check(&self, service_name: &str, url: &str) -> Option<bool> {
        let instance = self.registry.get(service_name)?.find(url)?;
        tracing::info!(service = %service_name, url = %url, "Forced health check");
        Some(self.check(&instance).await)
    }

    async fn check(&self, instance: &Arc<ServiceInstance>) -> bool {
        let ticket = self.registry.begin_probe();
        let started = Instant::now();
        let healthy = self.probe(instance).await;
        let latency = healthy.then(|| started.elapsed());

        instance.record_probe(latency);
        self.registry.update_health_with_ticket(
            instance.service_name(),
            instance.url(),
            healthy,
            ticket,
        );
        metrics::record_instance_health(
            instance.service_name(),
            instance.instance_id(),
            instance.is_healthy(),
        );
        healthy
    }

    async fn probe(&self, instance: &ServiceInstance) -> bool {
        let request = match Request::builder()
            .method("GET")
            .uri(instance.health_url())
            .header("user-agent", "ai-load-balancer-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(
                    service = %instance.service_name(),
                    health_url = %instance.health_url(),
                    error = %e,
                    "Health check failed: invalid health URL"
                );
                return false;
            }
        };

        let timeout: Duration = self.config.timeout();
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(
                        service = %instance.service_name(),
                        url = %instance.url(),
                        status = %response.status(),
                        "Health check failed: non-success status"
                    );
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    service = %instance.service_name(),
                    url = %instance.url(),
                    error = %e,
                    "Health check failed: connection error"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    service = %instance.service_name(),
                    url = %instance.url(),
                    "Health check failed: timeout"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    async fn serve(status: StatusCode) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/health", get(move || async move { status }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn checker(registry: Arc<InstanceRegistry>) -> HealthChecker {
        HealthChecker::new(
            registry,
            HealthCheckConfig {
                enabled: true,
                interval_secs: 5,
                timeout_ms: 500,
            },
        )
    }

    #[tokio::test]
    async fn probes_mark_health() {
        let up = serve(StatusCode::OK).await;
        let down = serve(StatusCode::SERVICE_UNAVAILABLE).await;

        let registry = Arc::new(InstanceRegistry::new());
        registry.add_instance("cart", &up, &format!("{up}/health"), "up");
        registry.add_instance("cart", &down, &format!("{down}/health"), "down");
        registry.add_instance("cart", "http://127.0.0.1:1", "http://127.0.0.1:1/health", "dead");

        checker(registry.clone()).check_all().await;

        let healthy: Vec<_> = registry
            .healthy_instances("cart")
            .iter()
            .map(|i| i.instance_id().to_string())
            .collect();
        assert_eq!(healthy, vec!["up"]);

        let up_instance = registry.get("cart").unwrap().find(&up).unwrap();
        assert!(up_instance.last_health_check().is_some());
        assert!(up_instance.last_probe_latency_ms().is_some());
    }

    #[tokio::test]
    async fn force_check_reports_outcome() {
        let up = serve(StatusCode::OK).await;
        let registry = Arc::new(InstanceRegistry::new());
        registry.add_instance("cart", &up, &format!("{up}/health"), "up");
        registry.update_health("cart", &up, false);

        let checker = checker(registry.clone());
        assert_eq!(checker.force_check("cart", &up).await, Some(true));
        assert_eq!(registry.healthy_instances("cart").len(), 1);
        assert_eq!(checker.force_check("cart", "http://nope:1").await, None);
        assert_eq!(checker.force_check("order", &up).await, None);
    }
}
