//! Self-registration heartbeat.
//!
//! Publishes one instance record with a TTL and refreshes it until shutdown,
//! then deletes it. Backends embedding this crate use it to announce
//! themselves; the balancer only reads the records back.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::discovery::error::DiscoveryError;
use crate::discovery::source::ServiceRecord;
use crate::discovery::store::KeyValueStore;

pub struct Heartbeat {
    store: Arc<dyn KeyValueStore>,
    record: ServiceRecord,
    key: String,
    ttl: Duration,
}

impl Heartbeat {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        prefix: &str,
        record: ServiceRecord,
        ttl: Duration,
    ) -> Self {
        let key = record.key(prefix);
        Self {
            store,
            record,
            key,
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Refresh period: a third of the TTL, so two beats may be lost.
    pub fn period(&self) -> Duration {
        (self.ttl / 3).max(Duration::from_millis(100))
    }

    /// Write the record once.
    pub async fn publish(&self) -> Result<(), DiscoveryError> {
        let value = serde_json::to_string(&self.record).map_err(DiscoveryError::Encode)?;
        self.store.set_with_ttl(&self.key, &value, self.ttl).await
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(self.period());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.publish().await {
                        Ok(()) => tracing::debug!(key = %self.key, "Heartbeat published"),
                        Err(e) => tracing::warn!(key = %self.key, error = %e, "Heartbeat failed"),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        if let Err(e) = self.store.delete(&self.key).await {
            tracing::warn!(key = %self.key, error = %e, "Failed to deregister");
        } else {
            tracing::info!(key = %self.key, "Deregistered");
        }
    }
}
