//! HTTP client for the external RL decision service.
//!
//! # Endpoints
//! - `POST /decide`   → routing decision for a service
//! - `POST /feedback` → observed outcome of a routed request
//! - `GET  /health`   → agent readiness
//! - `GET  /stats`    → learning statistics (opaque to the balancer)

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RlRemoteConfig;

#[derive(Debug, thiserror::Error)]
pub enum RlClientError {
    #[error("RL service timed out")]
    Timeout,
    #[error("RL service returned status {0}")]
    Status(u16),
    #[error("RL service transport error: {0}")]
    Transport(#[source] reqwest::Error),
}

impl From<reqwest::Error> for RlClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RlClientError::Timeout
        } else if let Some(status) = e.status() {
            RlClientError::Status(status.as_u16())
        } else {
            RlClientError::Transport(e)
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DecisionRequest {
    pub service_name: String,
    pub request_path: String,
    pub request_method: String,
    pub available_pods: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RoutingDecision {
    #[serde(default)]
    pub selected_pod: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub decision_type: Option<String>,
    #[serde(default)]
    pub state_encoded: Option<String>,
    #[serde(default)]
    pub available_pods: Vec<String>,
    #[serde(default)]
    pub decision_time_ms: f64,
}

/// Outcome of one proxied request, as reported back to the RL service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub service_name: String,
    pub selected_pod: String,
    pub response_time_ms: f64,
    pub status_code: u16,
    pub error_occurred: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AgentHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub rl_agent_ready: bool,
    #[serde(default)]
    pub prometheus_connected: bool,
    #[serde(default)]
    pub q_table_size: u64,
}

impl AgentHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.rl_agent_ready
    }
}

pub struct RlDecisionClient {
    http: reqwest::Client,
    base_url: String,
    decision_timeout: Duration,
    call_timeout: Duration,
}

impl RlDecisionClient {
    pub fn new(config: &RlRemoteConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            decision_timeout: config.decision_timeout(),
            call_timeout: config.feedback_timeout(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn decide(&self, request: &DecisionRequest) -> Result<RoutingDecision, RlClientError> {
        let res = self
            .http
            .post(format!("{}/decide", self.base_url))
            .timeout(self.decision_timeout)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    pub async fn feedback(&self, record: &FeedbackRecord) -> Result<(), RlClientError> {
        self.http
            .post(format!("{}/feedback", self.base_url))
            .timeout(self.call_timeout)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn health(&self) -> Result<AgentHealth, RlClientError> {
        let res = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(self.call_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    pub async fn stats(&self) -> Result<serde_json::Value, RlClientError> {
        let res = self
            .http
            .get(format!("{}/stats", self.base_url))
            .timeout(self.call_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }
}
