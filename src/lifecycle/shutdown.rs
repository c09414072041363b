//! Shutdown coordination for the balancer.

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Named background tasks, joined on shutdown.
#[derive(Default)]
pub struct BackgroundTasks {
    set: JoinSet<&'static str>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "Background task started");
        self.set.spawn(async move {
            task.await;
            name
        });
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait for every task, aborting the rest once `deadline` passes.
    pub async fn join_all(mut self, deadline: Duration) {
        let drain = async {
            while let Some(result) = self.set.join_next().await {
                match result {
                    Ok(name) => tracing::debug!(task = name, "Background task stopped"),
                    Err(e) => tracing::error!(error = %e, "Background task failed"),
                }
            }
        };

        if tokio::time::timeout(deadline, drain).await.is_err() {
            tracing::warn!(remaining = self.set.len(), "Aborting background tasks after deadline");
            self.set.abort_all();
        }
    }
}
