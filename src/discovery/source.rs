//! Pull adapter over the discovery store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::discovery::error::DiscoveryError;
use crate::discovery::store::KeyValueStore;

/// Instance descriptor as published by a backend's self-registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub service_name: String,
    #[serde(default)]
    pub instance_name: String,
    pub url: String,
    #[serde(default)]
    pub health_url: String,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_healthy() -> bool {
    true
}

impl ServiceRecord {
    /// Key the record is published under.
    pub fn key(&self, prefix: &str) -> String {
        format!("{prefix}{}:{}", self.service_name, self.instance_name)
    }
}

/// Authoritative instance list, grouped by service name.
pub type DiscoveredServices = BTreeMap<String, Vec<ServiceRecord>>;

/// Reads every published instance record from the store.
pub struct ServiceDiscoverySource {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl ServiceDiscoverySource {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fetch all records.
    ///
    /// A failed key listing or a failed read of any listed key is an error,
    /// since a partial view would look like missing instances. A key that
    /// expired between listing and reading is absent. An undecodable record
    /// is skipped with a warning.
    pub async fn fetch(&self) -> Result<DiscoveredServices, DiscoveryError> {
        let keys = self.store.keys(&self.prefix).await?;
        let mut services = DiscoveredServices::new();

        for key in keys {
            let raw = match self.store.get(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to read discovery record");
                    return Err(e);
                }
            };

            match serde_json::from_str::<ServiceRecord>(&raw) {
                Ok(record) => services
                    .entry(record.service_name.clone())
                    .or_default()
                    .push(record),
                Err(source) => {
                    let e = DiscoveryError::Decode { key, source };
                    tracing::warn!(error = %e, "Skipping discovery record");
                }
            }
        }

        Ok(services)
    }
}
