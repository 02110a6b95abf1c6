use std::sync::Arc;
use std::time::Instant;

use gatekeeper_models::opinion::{Opinion, TradeContext};
use tracing::{error, info, warn};

use crate::retry::RetryPolicy;
use crate::source::OpinionSource;

/// A source that produced no opinion this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Opinions gathered for one trade, plus the sources that did not answer.
#[derive(Debug, Clone, Default)]
pub struct PanelResult {
    pub opinions: Vec<Opinion>,
    pub failures: Vec<SourceFailure>,
}

impl PanelResult {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() && !self.opinions.is_empty()
    }
}

/// Queries every configured opinion source concurrently.
pub struct OpinionPanel {
    sources: Vec<Arc<dyn OpinionSource>>,
    retry: RetryPolicy,
}

impl OpinionPanel {
    pub fn new(sources: Vec<Arc<dyn OpinionSource>>, retry: RetryPolicy) -> Self {
        Self { sources, retry }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Fan out to all sources. Each source is individually time-boxed and
    /// retried, so one slow source cannot hold up the others.
    pub async fn collect(&self, ctx: &TradeContext) -> PanelResult {
        let mut handles = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let source = Arc::clone(source);
            let ctx = ctx.clone();
            let retry = self.retry.clone();
            let name = source.name().to_string();

            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let result = retry.run(&task_name, |_| source.review(&ctx)).await;
                (result, started.elapsed())
            });
            handles.push((name, handle));
        }

        let mut result = PanelResult::default();
        for (name, handle) in handles {
            match handle.await {
                Ok((Ok(opinion), elapsed)) => {
                    info!(
                        source = %name,
                        approve = opinion.approve,
                        confidence = opinion.confidence,
                        risk_score = opinion.risk_score,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Opinion received"
                    );
                    result.opinions.push(opinion);
                }
                Ok((Err(e), elapsed)) => {
                    warn!(source = %name, error = %e, elapsed_ms = elapsed.as_millis() as u64, "Opinion source failed");
                    result.failures.push(SourceFailure {
                        source: name,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(source = %name, error = %e, "Opinion task panicked");
                    result.failures.push(SourceFailure {
                        source: name,
                        error: format!("task failed: {e}"),
                    });
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        sample_context, FailingSource, FixedSource, FlakySource, PanickingSource, SlowSource,
    };
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_millis(100),
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn collects_all_answers() {
        let panel = OpinionPanel::new(
            vec![
                Arc::new(FixedSource::approving("technical", 80.0, 0.0)),
                Arc::new(FixedSource::rejecting("risk", 60.0, 4.0)),
            ],
            policy(),
        );
        let result = panel.collect(&sample_context("BTC-USD")).await;
        assert_eq!(result.opinions.len(), 2);
        assert!(result.failures.is_empty());
        assert!(!result.is_partial());
    }

    #[tokio::test]
    async fn failing_and_slow_sources_degrade_gracefully() {
        let panel = OpinionPanel::new(
            vec![
                Arc::new(FixedSource::approving("technical", 70.0, 2.0)),
                Arc::new(FailingSource::new("risk")),
                Arc::new(SlowSource::new("sentiment", Duration::from_secs(5))),
            ],
            policy(),
        );
        let started = Instant::now();
        let result = panel.collect(&sample_context("ETH-USD")).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.opinions.len(), 1);
        assert_eq!(result.opinions[0].source, "technical");
        let mut failed: Vec<&str> = result.failures.iter().map(|f| f.source.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["risk", "sentiment"]);
        assert!(result.is_partial());
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let flaky = Arc::new(FlakySource::new("risk", 1, FixedSource::approving("risk", 90.0, 1.0)));
        let panel = OpinionPanel::new(vec![flaky.clone() as Arc<dyn OpinionSource>], policy());
        let result = panel.collect(&sample_context("SOL-USD")).await;
        assert_eq!(result.opinions.len(), 1);
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn panicked_source_is_reported_by_name() {
        let panel = OpinionPanel::new(
            vec![
                Arc::new(PanickingSource::new("sentiment")),
                Arc::new(FixedSource::approving("technical", 75.0, 1.0)),
            ],
            policy(),
        );
        let result = panel.collect(&sample_context("BTC-USD")).await;

        assert_eq!(result.opinions.len(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].source, "sentiment");
        assert!(result.failures[0].error.contains("panicked"));
        assert!(result.is_partial());
    }

    #[tokio::test]
    async fn empty_panel_yields_nothing() {
        let panel = OpinionPanel::new(vec![], policy());
        let result = panel.collect(&sample_context("BTC-USD")).await;
        assert!(result.opinions.is_empty());
        assert!(result.failures.is_empty());
    }
}
