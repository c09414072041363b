//! Best-effort outcome reporting to the RL service.
//!
//! The request path only enqueues; a worker task delivers. A full queue or a
//! failed delivery drops the record and counts it.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::observability::metrics;
use crate::rl::client::{FeedbackRecord, RlDecisionClient};

#[derive(Clone)]
pub struct FeedbackReporter {
    tx: mpsc::Sender<FeedbackRecord>,
}

impl FeedbackReporter {
    /// Create a reporter and the worker that drains its queue.
    pub fn channel(client: Arc<RlDecisionClient>, capacity: usize) -> (Self, FeedbackWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, FeedbackWorker { rx, client })
    }

    /// Queue a record without waiting. Never fails the caller.
    pub fn report(&self, record: FeedbackRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                tracing::debug!(service = %record.service_name, "Feedback queue full, dropping record");
                metrics::record_feedback_failed(&record.service_name, "queue_full");
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                tracing::debug!(service = %record.service_name, "Feedback worker stopped, dropping record");
                metrics::record_feedback_failed(&record.service_name, "closed");
            }
        }
    }
}

pub struct FeedbackWorker {
    rx: mpsc::Receiver<FeedbackRecord>,
    client: Arc<RlDecisionClient>,
}

impl FeedbackWorker {
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                record = self.rx.recv() => {
                    let Some(record) = record else { break };
                    self.deliver(record).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Feedback worker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn deliver(&self, record: FeedbackRecord) {
        match self.client.feedback(&record).await {
            Ok(()) => metrics::record_feedback_sent(&record.service_name, &record.selected_pod),
            Err(e) => {
                tracing::debug!(
                    service = %record.service_name,
                    pod = %record.selected_pod,
                    error = %e,
                    "Failed to deliver feedback"
                );
                metrics::record_feedback_failed(&record.service_name, "delivery");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RlRemoteConfig;
    use axum::{routing::post, Json, Router};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn record(pod: &str) -> FeedbackRecord {
        FeedbackRecord {
            service_name: "cart".into(),
            selected_pod: pod.into(),
            response_time_ms: 3.0,
            status_code: 200,
            error_occurred: false,
        }
    }

    #[tokio::test]
    async fn worker_delivers_queued_records() {
        let received = Arc::new(Mutex::new(Vec::<FeedbackRecord>::new()));
        let sink = received.clone();
        let app = Router::new().route(
            "/feedback",
            post(move |Json(r): Json<FeedbackRecord>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(r);
                    "ok"
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = Arc::new(RlDecisionClient::new(&RlRemoteConfig {
            base_url: format!("http://{addr}"),
            ..RlRemoteConfig::default()
        }));
        let (reporter, worker) = FeedbackReporter::channel(client, 8);
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(worker.run(rx));

        reporter.report(record("cart-0"));
        reporter.report(record("cart-1"));

        for _ in 0..50 {
            if received.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tx.send(()).unwrap();
        task.await.unwrap();

        let pods: Vec<_> = received
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.selected_pod.clone())
            .collect();
        assert_eq!(pods, vec!["cart-0", "cart-1"]);
    }

    #[tokio::test]
    async fn full_queue_never_blocks() {
        let client = Arc::new(RlDecisionClient::new(&RlRemoteConfig::default()));
        let (reporter, _worker) = FeedbackReporter::channel(client, 1);
        reporter.report(record("a"));
        // Second record is dropped; the call returns immediately.
        reporter.report(record("b"));
    }
}
