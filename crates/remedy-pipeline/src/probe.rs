// ABOUTME: Timing probe client reading the elapsed milliseconds of one workload invocation
// ABOUTME: Faults surface as RemedyError::Probe; the pipeline swaps in a sentinel value
use async_trait::async_trait;
use remedy_core::{ProbeConfig, RemedyError, Result};
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait TimingProbe: Send + Sync {
    /// Elapsed milliseconds of one workload invocation.
    async fn measure(&self) -> Result<f64>;
}

pub struct HttpTimingProbe {
    client: Client,
    endpoint: String,
    field: String,
    timeout: Duration,
}

impl HttpTimingProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RemedyError::Probe(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            field: config.field.clone(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl TimingProbe for HttpTimingProbe {
    async fn measure(&self) -> Result<f64> {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RemedyError::Probe(format!("GET {}: {}", self.endpoint, e)))?
            .error_for_status()
            .map_err(|e| RemedyError::Probe(e.to_string()))?;

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| RemedyError::Probe(format!("decoding probe response: {}", e)))?;

        let elapsed = elapsed_from_json(&body, &self.field)?;
        debug!(endpoint = %self.endpoint, elapsed_ms = elapsed, "probe measured");
        Ok(elapsed)
    }
}

/// Read a finite number from `field` of a probe response.
pub fn elapsed_from_json(body: &JsonValue, field: &str) -> Result<f64> {
    body.get(field)
        .and_then(JsonValue::as_f64)
        .filter(|value| value.is_finite())
        .ok_or_else(|| RemedyError::Probe(format!("probe response has no numeric `{}`", field)))
}
