//! Key-value store abstraction for instance records.
//!
//! Backends publish their descriptors under `service:<name>:<instanceId>`
//! with a TTL; the balancer lists and reads them back.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::discovery::error::DiscoveryError;

/// Store holding self-registered instance records.
///
/// Implementations must be thread-safe and must hide expired entries.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Lists live keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, DiscoveryError>;

    /// Reads a value. `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, DiscoveryError>;

    /// Writes a value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), DiscoveryError>;

    /// Removes a key. Idempotent.
    async fn delete(&self, key: &str) -> Result<(), DiscoveryError>;
}

#[derive(Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process TTL store.
///
/// Used when embedding the balancer without Redis and in tests.
#[derive(Default)]
pub struct MemoryStore {
    data: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, DiscoveryError> {
        let mut keys = Vec::new();
        let mut expired = Vec::new();

        for entry in &self.data {
            if !entry.key().starts_with(prefix) {
                continue;
            }
            if entry.value().is_expired() {
                expired.push(entry.key().clone());
            } else {
                keys.push(entry.key().clone());
            }
        }

        for key in expired {
            self.data.remove_if(&key, |_, e| e.is_expired());
        }

        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, DiscoveryError> {
        let Some(entry) = self.data.get(key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry);
            self.data.remove_if(key, |_, e| e.is_expired());
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), DiscoveryError> {
        self.data.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DiscoveryError> {
        self.data.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keys_filter_by_prefix() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        store.set_with_ttl("service:cart:1", "{}", ttl).await.unwrap();
        store.set_with_ttl("service:order:1", "{}", ttl).await.unwrap();
        store.set_with_ttl("session:abc", "{}", ttl).await.unwrap();

        let keys = store.keys("service:").await.unwrap();
        assert_eq!(keys, vec!["service:cart:1", "service:order:1"]);
    }

    #[tokio::test]
    async fn expired_entries_disappear() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("service:cart:1", "{}", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.keys("service:").await.unwrap().is_empty());
        assert_eq!(store.get("service:cart:1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_secs(1))
            .await
            .unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
