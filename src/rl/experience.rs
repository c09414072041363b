//! Experience logging for offline training.
//!
//! Every proxied request can yield one `(state, action, reward, next_state)`
//! record. The request path only enqueues; a worker posts each record to
//! `{collector}/experience`. A disabled logger has no queue and no worker.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::config::CollectorConfig;
use crate::observability::metrics::{self, InstanceMetrics};
use crate::rl::client::RlClientError;

/// Per-instance metrics of one service at a point in time.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StateSnapshot {
    /// Unix milliseconds.
    pub timestamp: u64,
    pub metrics: BTreeMap<String, InstanceMetrics>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExperienceMetadata {
    pub service: String,
    pub path: String,
    pub status: u16,
    pub strategy: String,
    pub response_time_ms: f64,
}

/// One transition as consumed by the offline trainer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Experience {
    pub state: StateSnapshot,
    /// Instance id that served the request.
    pub action: String,
    pub reward: f64,
    pub next_state: StateSnapshot,
    pub metadata: ExperienceMetadata,
}

/// Reward for a single outcome.
pub fn reward_for_status(status: u16) -> f64 {
    if status >= 500 {
        -2.0
    } else if status >= 400 {
        -1.0
    } else if status >= 300 {
        0.0
    } else {
        1.0
    }
}

#[derive(Clone)]
pub struct ExperienceLogger {
    tx: Option<mpsc::Sender<Experience>>,
}

impl ExperienceLogger {
    /// Build the logger and, when the collector is enabled, the worker that drains it.
    pub fn channel(config: &CollectorConfig) -> (Self, Option<ExperienceWorker>) {
        if !config.enabled {
            return (Self::disabled(), None);
        }

        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let worker = ExperienceWorker {
            rx,
            client: CollectorClient::new(&config.endpoint_url, config.timeout()),
        };
        tracing::info!(endpoint = %config.endpoint_url, "Experience collector enabled");
        (Self { tx: Some(tx) }, Some(worker))
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Snapshots are only worth taking when this is true.
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue a record without waiting. Never fails the caller.
    pub fn log(&self, experience: Experience) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(experience) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Experience queue full, dropping record");
                metrics::record_experience_failed("queue_full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::record_experience_failed("closed");
            }
        }
    }
}

/// HTTP client for the experience collector.
pub struct CollectorClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl CollectorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/experience", base_url.trim_end_matches('/')),
            timeout,
        }
    }

    pub async fn send(&self, experience: &Experience) -> Result<(), RlClientError> {
        self.http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(experience)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub struct ExperienceWorker {
    rx: mpsc::Receiver<Experience>,
    client: CollectorClient,
}

impl ExperienceWorker {
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                experience = self.rx.recv() => {
                    let Some(experience) = experience else { break };
                    match self.client.send(&experience).await {
                        Ok(()) => metrics::record_experience_sent(),
                        Err(e) => {
                            tracing::debug!(
                                action = %experience.action,
                                error = %e,
                                "Failed to deliver experience"
                            );
                            metrics::record_experience_failed("delivery");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Experience worker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
