//! HTTP client for the remote scoring service.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::batch::{normalize_rows, BatchResponse, RawRow};
use super::domain::{FormInput, Prediction};
use crate::config::ScoringConfig;

/// Failure talking to the scoring service. Every variant is recoverable.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("scoring service unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("scoring service returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("scoring service response from {url} could not be decoded: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl TransportError {
    /// Decode failures mean the service answered; retrying will not help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Unreachable { .. } | TransportError::Status { .. }
        )
    }
}

/// Linear backoff: attempt `n` waits `base_delay * (n + 1)` before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }
}

/// Run `operation` up to `max_retries + 1` times, sleeping between attempts.
pub async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    max_retries: u32,
    mut operation: F,
) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries && err.is_retryable() => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, ?delay, error = %err, "scoring attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(attempts = attempt + 1, error = %err, "scoring request failed");
                return Err(err);
            }
        }
    }
}

/// Liveness payload from `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Last known liveness of the scoring service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceStatus {
    Checking,
    Up { service: String },
    Down { reason: String },
}

impl ServiceStatus {
    pub fn from_probe(result: Result<ServiceInfo, TransportError>) -> Self {
        match result {
            Ok(info) => ServiceStatus::Up {
                service: info.service,
            },
            Err(err) => ServiceStatus::Down {
                reason: err.to_string(),
            },
        }
    }

    pub fn message(&self) -> String {
        match self {
            ServiceStatus::Checking => "Checking API status…".to_string(),
            ServiceStatus::Up { service } => format!("{service} is online"),
            ServiceStatus::Down { .. } => "Scoring API is offline".to_string(),
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, ServiceStatus::Up { .. })
    }
}

/// Paginated audit log fetch result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditLogPage {
    #[serde(default)]
    pub entries: Vec<Value>,
}

/// Read-only oversight data fetched for analyst and admin roles.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OversightSnapshot {
    pub model_registry: Option<Value>,
    pub fairness_metrics: Option<Value>,
    pub audit_logs: Vec<Value>,
}

pub const AUDIT_LOG_PAGE_SIZE: usize = 120;

/// Seam between the orchestrator and the network.
pub trait RiskApi: Send + Sync {
    /// Score with bounded retries.
    fn score(
        &self,
        input: &FormInput,
        max_retries: u32,
    ) -> impl Future<Output = Result<Prediction, TransportError>> + Send;

    /// Single unretried liveness probe.
    fn health_check(&self) -> impl Future<Output = Result<ServiceInfo, TransportError>> + Send;

    fn score_batch(
        &self,
        rows: &[RawRow],
    ) -> impl Future<Output = Result<BatchResponse, TransportError>> + Send;

    fn oversight(&self) -> impl Future<Output = Result<OversightSnapshot, TransportError>> + Send;
}

/// reqwest-backed [`RiskApi`].
#[derive(Debug, Clone)]
pub struct PredictionClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl PredictionClient {
    pub fn new(config: &ScoringConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            retry: RetryPolicy {
                base_delay: config.retry_base_delay,
            },
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn score_once(&self, input: &FormInput) -> Result<Prediction, TransportError> {
        let url = self.url("/predict");
        let response = self
            .http
            .post(&url)
            .json(input)
            .send()
            .await
            .map_err(|source| TransportError::Unreachable {
                url: url.clone(),
                source,
            })?;
        decode(url, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| TransportError::Unreachable {
                url: url.clone(),
                source,
            })?;
        decode(url, response).await
    }

    pub async fn model_registry(&self) -> Result<Value, TransportError> {
        self.get_json("/model-registry").await
    }

    pub async fn fairness_metrics(&self) -> Result<Value, TransportError> {
        self.get_json("/fairness-metrics").await
    }

    pub async fn audit_logs(&self, limit: usize) -> Result<AuditLogPage, TransportError> {
        self.get_json(&format!("/audit-logs?limit={limit}")).await
    }
}

async fn decode<T: DeserializeOwned>(
    url: String,
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            url,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|source| TransportError::Decode { url, source })
}

impl RiskApi for PredictionClient {
    async fn score(&self, input: &FormInput, max_retries: u32) -> Result<Prediction, TransportError> {
        with_retries(self.retry, max_retries, |attempt| {
            debug!(attempt, url = %self.base_url, "posting scoring request");
            self.score_once(input)
        })
        .await
    }

    async fn health_check(&self) -> Result<ServiceInfo, TransportError> {
        self.get_json("/").await
    }

    async fn score_batch(&self, rows: &[RawRow]) -> Result<BatchResponse, TransportError> {
        let url = self.url("/predict/batch");
        let payload = normalize_rows(rows);
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| TransportError::Unreachable {
                url: url.clone(),
                source,
            })?;
        decode(url, response).await
    }

    async fn oversight(&self) -> Result<OversightSnapshot, TransportError> {
        let (registry, fairness, logs) = tokio::join!(
            self.model_registry(),
            self.fairness_metrics(),
            self.audit_logs(AUDIT_LOG_PAGE_SIZE)
        );

        Ok(OversightSnapshot {
            model_registry: Some(registry?),
            fairness_metrics: Some(fairness?),
            audit_logs: logs?.entries,
        })
    }
}
