//! Periodic reconciliation of the registry against the discovery store.
//!
//! # Rules
//! - A failed listing, a failed record read or an empty store skips the
//!   round entirely, so an outage is never read as "no instances"
//! - Only services present in the store are touched
//! - Healthy discovered instances missing locally are added
//! - Local instances absent from the healthy discovered subset are removed

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::discovery::source::{ServiceDiscoverySource, ServiceRecord};
use crate::observability::metrics;
use crate::registry::{derive_instance_id, InstanceRegistry};

/// Result of one reconciliation round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied {
        services: usize,
        added: usize,
        removed: usize,
    },
    /// The store had no records; registry left untouched.
    Empty,
    /// The store could not be listed or a record could not be read;
    /// registry left untouched.
    Failed,
}

pub struct RegistrySync {
    registry: Arc<InstanceRegistry>,
    source: ServiceDiscoverySource,
    interval: Duration,
    timeout: Duration,
}

impl RegistrySync {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        source: ServiceDiscoverySource,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            source,
            interval,
            timeout,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            prefix = %self.source.prefix(),
            "Discovery sync starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Discovery sync received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one reconciliation round.
    pub async fn sync_once(&self) -> SyncOutcome {
        // Each store call has its own timeout; this bounds the whole listing.
        let budget = self.timeout.saturating_mul(4);
        let discovered = match time::timeout(budget, self.source.fetch()).await {
            Ok(Ok(discovered)) => discovered,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Discovery fetch failed, keeping current registry");
                metrics::record_discovery_sync("error");
                return SyncOutcome::Failed;
            }
            Err(_) => {
                tracing::warn!(timeout = ?budget, "Discovery fetch timed out, keeping current registry");
                metrics::record_discovery_sync("error");
                return SyncOutcome::Failed;
            }
        };

        if discovered.is_empty() {
            tracing::debug!("No service records in discovery store");
            metrics::record_discovery_sync("empty");
            return SyncOutcome::Empty;
        }

        let mut added = 0;
        let mut removed = 0;
        for (service_name, records) in &discovered {
            let (a, r) = self.reconcile_service(service_name, records);
            added += a;
            removed += r;
        }

        tracing::debug!(
            services = discovered.len(),
            added,
            removed,
            "Discovery sync applied"
        );
        metrics::record_discovery_sync("applied");

        SyncOutcome::Applied {
            services: discovered.len(),
            added,
            removed,
        }
    }

    fn reconcile_service(&self, service_name: &str, records: &[ServiceRecord]) -> (usize, usize) {
        let service = self.registry.register(service_name);
        let healthy: Vec<&ServiceRecord> = records.iter().filter(|r| r.healthy).collect();

        let mut added = 0;
        for record in &healthy {
            let health_url = if record.health_url.is_empty() {
                format!("{}/actuator/health", record.url.trim_end_matches('/'))
            } else {
                record.health_url.clone()
            };
            let instance_id = if record.instance_name.is_empty() {
                derive_instance_id(service_name, &record.url)
            } else {
                record.instance_name.clone()
            };
            if self
                .registry
                .add_instance(service_name, &record.url, &health_url, &instance_id)
            {
                added += 1;
            }
        }

        let keep: HashSet<String> = healthy.iter().map(|r| r.url.to_ascii_lowercase()).collect();
        let mut removed = 0;
        for instance in service.instances() {
            if !keep.contains(&instance.url().to_ascii_lowercase())
                && self.registry.remove_instance(service_name, instance.url())
            {
                removed += 1;
            }
        }

        (added, removed)
    }
}
