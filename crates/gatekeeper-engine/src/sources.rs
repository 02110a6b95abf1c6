use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_models::config::{ExecutionConfig, ExecutionMode};
use gatekeeper_models::decision::ExecutionOrder;
use gatekeeper_models::prediction::PredictionReply;
use tracing::info;

use crate::error::EngineError;

/// Where predictions come from. Mockable for testing.
#[async_trait]
pub trait PredictionSource: Send + Sync {
    async fn fetch(&self, instrument: &str) -> Result<PredictionReply, EngineError>;
}

/// Receives accepted decisions. Placement mechanics live on the other side.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, order: &ExecutionOrder) -> Result<(), EngineError>;
}

/// `GET {base_url}/predictions/{instrument}` returning a `PredictionReply`.
pub struct HttpPredictionSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPredictionSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn url_for(&self, instrument: &str) -> String {
        format!("{}/predictions/{}", self.base_url, instrument)
    }
}

#[async_trait]
impl PredictionSource for HttpPredictionSource {
    async fn fetch(&self, instrument: &str) -> Result<PredictionReply, EngineError> {
        let response = self.client.get(self.url_for(instrument)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::Prediction(format!("no prediction for {instrument}")));
        }
        Ok(response.error_for_status()?.json().await?)
    }
}

/// Logs orders instead of placing them.
pub struct DryRunExecution;

#[async_trait]
impl ExecutionEngine for DryRunExecution {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn submit(&self, order: &ExecutionOrder) -> Result<(), EngineError> {
        info!(
            instrument = %order.instrument,
            side = ?order.side,
            size_fraction = order.size_fraction,
            score = order.score,
            threshold = order.threshold,
            "Dry-run execution"
        );
        Ok(())
    }
}

/// `POST {base_url}/orders` with the order as JSON; any 2xx is success.
pub struct HttpExecution {
    base_url: String,
    client: reqwest::Client,
}

impl HttpExecution {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl ExecutionEngine for HttpExecution {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, order: &ExecutionOrder) -> Result<(), EngineError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .json(order)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Execution(format!("{status}: {body}")));
        }
        Ok(())
    }
}

/// Build the execution collaborator selected by `[execution]`.
pub fn build_execution(
    config: &ExecutionConfig,
    timeout: Duration,
) -> Result<Arc<dyn ExecutionEngine>, EngineError> {
    match config.mode {
        ExecutionMode::DryRun => Ok(Arc::new(DryRunExecution)),
        ExecutionMode::Http => {
            let base_url = config.base_url.as_deref().ok_or_else(|| {
                EngineError::Config("execution mode \"http\" needs base_url".to_string())
            })?;
            Ok(Arc::new(HttpExecution::new(base_url, timeout)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_url_layout() {
        let source = HttpPredictionSource::new("http://127.0.0.1:8090/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.url_for("BTC-USD"), "http://127.0.0.1:8090/predictions/BTC-USD");
    }

    #[test]
    fn http_execution_requires_base_url() {
        let config = ExecutionConfig {
            mode: ExecutionMode::Http,
            base_url: None,
        };
        assert!(matches!(
            build_execution(&config, Duration::from_secs(1)),
            Err(EngineError::Config(_))
        ));
        let dry = build_execution(&ExecutionConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(dry.name(), "dry_run");
    }

    #[tokio::test]
    async fn unreachable_prediction_source_errors() {
        let source = HttpPredictionSource::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        assert!(source.fetch("BTC-USD").await.is_err());
    }
}
