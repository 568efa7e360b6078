//! In-memory per-provider request metrics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Most recent failure seen for a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Aggregate request statistics for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Running average over successful calls with a latency sample
    pub average_latency_ms: f64,
    /// Number of samples behind `average_latency_ms`
    pub latency_samples: u64,
    pub last_error: Option<LastError>,
    /// Sum of recorded cost estimates in USD
    pub total_cost: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ProviderMetrics {
    /// Fraction of requests that succeeded, or `None` before the first request.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_requests > 0)
            .then(|| self.successful_requests as f64 / self.total_requests as f64)
    }

    /// Average latency, or `None` when no successful call has been timed.
    pub fn average_latency(&self) -> Option<f64> {
        (self.latency_samples > 0).then_some(self.average_latency_ms)
    }

    fn apply(&mut self, outcome: &RequestOutcome) {
        let now = Utc::now();
        self.total_requests += 1;
        self.last_used = Some(now);

        if outcome.success {
            self.successful_requests += 1;
            if let Some(latency) = outcome.latency_ms {
                self.latency_samples += 1;
                let n = self.latency_samples as f64;
                self.average_latency_ms = (self.average_latency_ms * (n - 1.0) + latency) / n;
            }
        } else {
            self.failed_requests += 1;
            if let Some(ref message) = outcome.error {
                self.last_error = Some(LastError {
                    message: message.clone(),
                    at: now,
                });
            }
        }

        if let Some(cost) = outcome.cost {
            self.total_cost += cost;
        }
    }
}

/// One request outcome to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub cost: Option<f64>,
    pub error: Option<String>,
}

impl RequestOutcome {
    pub fn success(latency_ms: f64) -> Self {
        Self {
            success: true,
            latency_ms: Some(latency_ms),
            cost: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            latency_ms: None,
            cost: None,
            error: Some(error.into()),
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Thread-safe metrics store keyed by provider id.
///
/// Each update holds the write lock only for the O(1) read-modify-write,
/// never across network I/O.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: RwLock<HashMap<String, ProviderMetrics>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome, creating the provider's entry on first use.
    pub async fn record(&self, provider: &str, outcome: RequestOutcome) {
        let mut metrics = self.inner.write().await;
        metrics.entry(provider.to_string()).or_default().apply(&outcome);

        tracing::trace!(
            provider = %provider,
            success = outcome.success,
            latency_ms = ?outcome.latency_ms,
            "Recorded provider metrics"
        );
    }

    pub async fn get(&self, provider: &str) -> Option<ProviderMetrics> {
        self.inner.read().await.get(provider).cloned()
    }

    pub async fn all(&self) -> HashMap<String, ProviderMetrics> {
        self.inner.read().await.clone()
    }

    /// Average latency per provider, for tie-breaking during selection.
    pub async fn average_latencies(&self) -> HashMap<String, f64> {
        self.inner
            .read()
            .await
            .iter()
            .filter_map(|(id, m)| m.average_latency().map(|avg| (id.clone(), avg)))
            .collect()
    }

    /// Clear one provider's metrics, or all of them.
    pub async fn reset(&self, provider: Option<&str>) {
        let mut metrics = self.inner.write().await;
        match provider {
            Some(id) => {
                metrics.remove(id);
            }
            None => metrics.clear(),
        }
    }
}
