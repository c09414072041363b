//! Redis-backed discovery store.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::discovery::error::DiscoveryError;
use crate::discovery::store::KeyValueStore;

/// Discovery store over a shared Redis instance.
///
/// The connection is opened lazily and dropped after any failure, so an
/// unreachable Redis never blocks startup and is retried on the next call.
pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    timeout: Duration,
}

impl RedisStore {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DiscoveryError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            connection: Mutex::new(None),
            timeout,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, DiscoveryError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| DiscoveryError::Timeout(self.timeout))??;

        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Run one command under the store timeout, forgetting the connection on failure.
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, DiscoveryError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.connection().await?;
        let result = match tokio::time::timeout(self.timeout, op(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DiscoveryError::Redis(e)),
            Err(_) => Err(DiscoveryError::Timeout(self.timeout)),
        };

        if result.is_err() {
            *self.connection.lock().await = None;
        }
        result
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, DiscoveryError> {
        let pattern = format!("{prefix}*");
        self.run(|mut conn| async move { conn.keys::<_, Vec<String>>(pattern).await })
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, DiscoveryError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), DiscoveryError> {
        let key = key.to_string();
        let value = value.to_string();
        let seconds = ttl.as_secs().max(1);
        self.run(|mut conn| async move { conn.set_ex::<_, _, ()>(key, value, seconds).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), DiscoveryError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.del::<_, ()>(key).await })
            .await
    }
}
