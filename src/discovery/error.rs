//! Discovery error types.

use std::time::Duration;

/// Failure talking to the discovery store.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid record under '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}
