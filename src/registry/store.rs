//! Service registry storage.
//!
//! # Responsibilities
//! - Map service names to their instance lists
//! - Keep instance urls unique per service
//! - Serialize mutations per service, never across services
//! - Notify observers when an instance leaves the registry

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::registry::instance::{HealthTicket, InstanceView, ServiceInstance};

/// Receives registry removal events.
///
/// Used by components holding per-instance state (metrics snapshots, gauges)
/// to reclaim it when an instance is evicted.
pub trait RegistryObserver: Send + Sync {
    fn instance_removed(&self, service_name: &str, url: &str);
}

/// All instances registered under one service name.
#[derive(Debug)]
pub struct Service {
    name: String,
    instances: RwLock<Vec<Arc<ServiceInstance>>>,
}

impl Service {
    fn new(name: String) -> Self {
        Self {
            name,
            instances: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consistent snapshot of the instance list, in registration order.
    pub fn instances(&self) -> Vec<Arc<ServiceInstance>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the instances currently marked healthy.
    pub fn healthy_instances(&self) -> Vec<Arc<ServiceInstance>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|i| i.is_healthy())
            .cloned()
            .collect()
    }

    pub fn find(&self, url: &str) -> Option<Arc<ServiceInstance>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|i| i.matches_url(url))
            .cloned()
    }

    pub fn view(&self) -> ServiceView {
        let instances: Vec<InstanceView> = self.instances().iter().map(|i| i.view()).collect();
        ServiceView {
            name: self.name.clone(),
            healthy_instances: instances.iter().filter(|i| i.healthy).count(),
            instances,
        }
    }
}

/// Admin-facing description of a service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub name: String,
    pub healthy_instances: usize,
    pub instances: Vec<InstanceView>,
}

/// Registry-wide counts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    pub total_services: usize,
    pub total_instances: usize,
    pub healthy_instances: usize,
}

/// Thread-safe registry of backend services and their instances.
pub struct InstanceRegistry {
    services: DashMap<String, Arc<Service>>,
    signal_seq: AtomicU64,
    observers: RwLock<Vec<Arc<dyn RegistryObserver>>>,
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("services", &self.services.len())
            .finish()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            signal_seq: AtomicU64::new(1),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to instance removals.
    pub fn add_observer(&self, observer: Arc<dyn RegistryObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Issue the next health ticket.
    ///
    /// Probes take a ticket when they start, so a result that arrives after a
    /// newer signal was applied is discarded.
    pub fn begin_probe(&self) -> HealthTicket {
        HealthTicket(self.signal_seq.fetch_add(1, Ordering::AcqRel))
    }

    /// Ensure a service record exists.
    pub fn register(&self, service_name: &str) -> Arc<Service> {
        self.services
            .entry(service_name.to_string())
            .or_insert_with(|| Arc::new(Service::new(service_name.to_string())))
            .clone()
    }

    /// Add an instance. Returns `false` if the url is already registered.
    pub fn add_instance(
        &self,
        service_name: &str,
        url: &str,
        health_url: &str,
        instance_id: &str,
    ) -> bool {
        let service = self.register(service_name);
        let mut instances = service
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if instances.iter().any(|i| i.matches_url(url)) {
            return false;
        }

        let ticket = self.begin_probe();
        instances.push(Arc::new(ServiceInstance::new(
            service_name,
            url,
            health_url,
            instance_id,
            ticket,
        )));
        drop(instances);

        tracing::info!(
            service = %service_name,
            url = %url,
            instance_id = %instance_id,
            "Instance registered"
        );
        true
    }

    /// Remove an instance. Returns `false` if it was not registered.
    pub fn remove_instance(&self, service_name: &str, url: &str) -> bool {
        let Some(service) = self.get(service_name) else {
            return false;
        };

        let removed = {
            let mut instances = service
                .instances
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let before = instances.len();
            instances.retain(|i| !i.matches_url(url));
            before != instances.len()
        };

        if removed {
            tracing::info!(service = %service_name, url = %url, "Instance removed");
            let observers = self
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for observer in observers {
                observer.instance_removed(service_name, url);
            }
        }
        removed
    }

    /// Set an instance's health flag with a fresh ticket.
    pub fn update_health(&self, service_name: &str, url: &str, healthy: bool) -> bool {
        let ticket = self.begin_probe();
        self.update_health_with_ticket(service_name, url, healthy, ticket)
    }

    /// Set an instance's health flag if `ticket` is newer than its last signal.
    pub fn update_health_with_ticket(
        &self,
        service_name: &str,
        url: &str,
        healthy: bool,
        ticket: HealthTicket,
    ) -> bool {
        let Some(instance) = self.get(service_name).and_then(|s| s.find(url)) else {
            return false;
        };

        let was_healthy = instance.is_healthy();
        let applied = instance.apply_health(healthy, ticket);
        if applied && was_healthy != healthy {
            tracing::info!(
                service = %service_name,
                url = %url,
                healthy,
                "Instance health changed"
            );
        }
        applied
    }

    pub fn get(&self, service_name: &str) -> Option<Arc<Service>> {
        self.services.get(service_name).map(|s| s.value().clone())
    }

    /// All services, sorted by name.
    pub fn list_all(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<_> = self.services.iter().map(|s| s.value().clone()).collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Healthy instances of a service; empty when the service is unknown.
    pub fn healthy_instances(&self, service_name: &str) -> Vec<Arc<ServiceInstance>> {
        self.get(service_name)
            .map(|s| s.healthy_instances())
            .unwrap_or_default()
    }

    /// Every instance of every service.
    pub fn all_instances(&self) -> Vec<Arc<ServiceInstance>> {
        self.list_all()
            .iter()
            .flat_map(|s| s.instances())
            .collect()
    }

    pub fn status(&self) -> RegistryStatus {
        let instances = self.all_instances();
        RegistryStatus {
            total_services: self.services.len(),
            total_instances: instances.len(),
            healthy_instances: instances.iter().filter(|i| i.is_healthy()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl RegistryObserver for Recorder {
        fn instance_removed(&self, service_name: &str, url: &str) {
            self.0
                .lock()
                .unwrap()
                .push((service_name.to_string(), url.to_string()));
        }
    }

    #[test]
    fn add_is_idempotent_on_url() {
        let registry = InstanceRegistry::new();
        assert!(registry.add_instance("cart", "http://a:1", "http://a:1/health", "a"));
        assert!(!registry.add_instance("cart", "http://a:1", "http://a:1/health", "a2"));
        assert!(!registry.add_instance("cart", "HTTP://A:1", "http://a:1/health", "a3"));
        assert_eq!(registry.get("cart").unwrap().instances().len(), 1);
    }

    #[test]
    fn interleaved_add_remove_never_duplicates() {
        let registry = InstanceRegistry::new();
        let urls = ["http://a:1", "http://b:1", "http://a:1", "http://c:1", "http://b:1"];
        for (i, url) in urls.iter().enumerate() {
            registry.add_instance("svc", url, "", "");
            if i % 2 == 1 {
                registry.remove_instance("svc", "http://a:1");
            }
            let snapshot = registry.get("svc").unwrap().instances();
            let mut seen: Vec<_> = snapshot.iter().map(|i| i.url().to_string()).collect();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), snapshot.len());
        }
    }

    #[test]
    fn concurrent_adds_keep_urls_unique() {
        let registry = Arc::new(InstanceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let url = format!("http://host:{}", (i + t) % 20);
                        registry.add_instance("svc", &url, "", "");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.get("svc").unwrap().instances().len(), 20);
    }

    #[test]
    fn removal_notifies_observers() {
        let registry = InstanceRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.add_observer(recorder.clone());

        registry.add_instance("cart", "http://a:1", "", "");
        assert!(registry.remove_instance("cart", "http://a:1"));
        assert!(!registry.remove_instance("cart", "http://a:1"));

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.as_slice(), &[("cart".to_string(), "http://a:1".to_string())]);
    }

    #[test]
    fn check_started_before_reregistration_is_ignored() {
        let registry = InstanceRegistry::new();
        registry.add_instance("cart", "http://a:1", "", "");

        let stale = registry.begin_probe();
        registry.remove_instance("cart", "http://a:1");
        registry.add_instance("cart", "http://a:1", "", "");

        assert!(!registry.update_health_with_ticket("cart", "http://a:1", false, stale));
        assert_eq!(registry.healthy_instances("cart").len(), 1);
    }

    #[test]
    fn healthy_filter_and_status() {
        let registry = InstanceRegistry::new();
        registry.register("empty");
        registry.add_instance("cart", "http://a:1", "", "");
        registry.add_instance("cart", "http://b:1", "", "");
        registry.update_health("cart", "http://b:1", false);

        let healthy = registry.healthy_instances("cart");
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].url(), "http://a:1");
        assert!(registry.healthy_instances("missing").is_empty());

        assert_eq!(
            registry.status(),
            RegistryStatus {
                total_services: 2,
                total_instances: 2,
                healthy_instances: 1,
            }
        );
    }
}
