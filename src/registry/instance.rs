//! A single backend service instance.
//!
//! # Responsibilities
//! - Carry the instance descriptor (service, url, health url, id)
//! - Track health with ordered signals so stale probes cannot win
//! - Track in-flight requests through an RAII guard

use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Ordering token for health signals.
///
/// Tickets are issued by the registry from one monotonically increasing
/// sequence. A health update carrying a ticket older than the last applied
/// one is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HealthTicket(pub(crate) u64);

/// A registered instance of a backend service.
#[derive(Debug)]
pub struct ServiceInstance {
    service_name: String,
    url: String,
    health_url: String,
    instance_id: String,

    /// `(ticket << 1) | healthy` of the last applied health signal.
    health: AtomicU64,
    /// Unix millis of the last probe, 0 if never probed.
    last_health_check_ms: AtomicU64,
    /// Latency of the last successful probe in millis, `u64::MAX` if none.
    last_probe_latency_ms: AtomicU64,
    /// Requests currently being forwarded to this instance.
    active_connections: AtomicUsize,
}

impl ServiceInstance {
    /// Create a new, healthy instance whose health history starts at `ticket`.
    pub fn new(
        service_name: impl Into<String>,
        url: impl Into<String>,
        health_url: impl Into<String>,
        instance_id: impl Into<String>,
        ticket: HealthTicket,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            url: url.into(),
            health_url: health_url.into(),
            instance_id: instance_id.into(),
            health: AtomicU64::new((ticket.0 << 1) | 1),
            last_health_check_ms: AtomicU64::new(0),
            last_probe_latency_ms: AtomicU64::new(u64::MAX),
            active_connections: AtomicUsize::new(0),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// True when `url` identifies this instance (ASCII case-insensitive).
    pub fn matches_url(&self, url: &str) -> bool {
        self.url.eq_ignore_ascii_case(url)
    }

    pub fn is_healthy(&self) -> bool {
        self.health.load(Ordering::Acquire) & 1 == 1
    }

    /// Apply a health signal if it is newer than the last applied one.
    ///
    /// Returns `true` when the signal was applied.
    pub fn apply_health(&self, healthy: bool, ticket: HealthTicket) -> bool {
        let next = (ticket.0 << 1) | u64::from(healthy);
        let mut current = self.health.load(Ordering::Acquire);
        loop {
            if current >> 1 >= ticket.0 {
                return false;
            }
            match self.health.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Record the bookkeeping of a completed probe.
    pub fn record_probe(&self, latency: Option<Duration>) {
        self.last_health_check_ms.store(unix_millis(), Ordering::Relaxed);
        let latency_ms = latency.map_or(u64::MAX, |d| d.as_millis() as u64);
        self.last_probe_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    /// Unix millis of the last probe.
    pub fn last_health_check(&self) -> Option<u64> {
        match self.last_health_check_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Latency of the last successful probe.
    pub fn last_probe_latency_ms(&self) -> Option<u64> {
        match self.last_probe_latency_ms.load(Ordering::Relaxed) {
            u64::MAX => None,
            ms => Some(ms),
        }
    }

    /// Get the current number of in-flight requests.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Count a request as in flight until the returned guard is dropped.
    pub fn acquire(self: &Arc<Self>) -> ConnectionGuard {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard {
            instance: self.clone(),
        }
    }

    /// Serializable view for the admin API.
    pub fn view(&self) -> InstanceView {
        InstanceView {
            service_name: self.service_name.clone(),
            instance_name: self.instance_id.clone(),
            url: self.url.clone(),
            health_url: self.health_url.clone(),
            healthy: self.is_healthy(),
            last_health_check: self.last_health_check(),
            response_time: self.last_probe_latency_ms(),
            active_connections: self.active_connections(),
        }
    }
}

/// A RAII guard that keeps an instance's in-flight count raised.
///
/// The count is decremented exactly once, when the guard is dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    instance: Arc<ServiceInstance>,
}

impl ConnectionGuard {
    pub fn instance(&self) -> &Arc<ServiceInstance> {
        &self.instance
    }
}

impl Deref for ConnectionGuard {
    type Target = ServiceInstance;
    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.instance
            .active_connections
            .fetch_sub(1, Ordering::AcqRel);
    }
}

/// Admin-facing description of an instance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub service_name: String,
    pub instance_name: String,
    pub url: String,
    pub health_url: String,
    pub healthy: bool,
    pub last_health_check: Option<u64>,
    pub response_time: Option<u64>,
    pub active_connections: usize,
}

/// Instance id used when a registration does not name one: `<service>@<host:port>`.
pub fn derive_instance_id(service_name: &str, url: &str) -> String {
    let authority = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            let host = u.host_str()?.to_string();
            Some(match u.port_or_known_default() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            })
        })
        .unwrap_or_else(|| url.to_string());
    format!("{service_name}@{authority}")
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
