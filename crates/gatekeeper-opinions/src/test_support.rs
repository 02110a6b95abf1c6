//! Mock opinion sources for exercising the panel and the decision loop
//! without a model CLI or network.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gatekeeper_models::opinion::{Opinion, TradeContext};
use gatekeeper_models::prediction::TradeSide;
use gatekeeper_models::threshold::Regime;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::OpinionError;
use crate::source::OpinionSource;

/// A trade context with neutral defaults.
pub fn sample_context(instrument: &str) -> TradeContext {
    TradeContext {
        request_id: Uuid::new_v4(),
        instrument: instrument.to_string(),
        side: TradeSide::Buy,
        prediction_value: Decimal::new(25, 3),
        volatility: 0.02,
        regime: Regime::Normal,
        requested_at: Utc::now(),
    }
}

/// Always returns the same verdict.
pub struct FixedSource {
    pub name: String,
    pub approve: bool,
    pub confidence: f64,
    pub risk_score: f64,
}

impl FixedSource {
    pub fn approving(name: &str, confidence: f64, risk_score: f64) -> Self {
        Self {
            name: name.to_string(),
            approve: true,
            confidence,
            risk_score,
        }
    }

    pub fn rejecting(name: &str, confidence: f64, risk_score: f64) -> Self {
        Self {
            approve: false,
            ..Self::approving(name, confidence, risk_score)
        }
    }
}

#[async_trait]
impl OpinionSource for FixedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, ctx: &TradeContext) -> Result<Opinion, OpinionError> {
        Ok(Opinion {
            source: self.name.clone(),
            approve: self.approve,
            confidence: self.confidence,
            risk_score: self.risk_score,
            reasoning: format!("fixed verdict for {}", ctx.instrument),
        })
    }
}

/// Always errors.
pub struct FailingSource {
    pub name: String,
}

impl FailingSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl OpinionSource for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, _ctx: &TradeContext) -> Result<Opinion, OpinionError> {
        Err(OpinionError::Cli("mock failure".to_string()))
    }
}

/// Panics inside `review`, taking its task down with it.
pub struct PanickingSource {
    pub name: String,
}

impl PanickingSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl OpinionSource for PanickingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, _ctx: &TradeContext) -> Result<Opinion, OpinionError> {
        panic!("{} blew up mid-review", self.name)
    }
}

/// Answers only after `delay`; longer than any test timeout makes it silent.
pub struct SlowSource {
    pub name: String,
    pub delay: Duration,
}

impl SlowSource {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl OpinionSource for SlowSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, ctx: &TradeContext) -> Result<Opinion, OpinionError> {
        tokio::time::sleep(self.delay).await;
        FixedSource::approving(&self.name, 100.0, 0.0).review(ctx).await
    }
}

/// Fails the first `failures` calls, then delegates to `inner`.
pub struct FlakySource {
    failures: u32,
    calls: AtomicU32,
    inner: FixedSource,
}

impl FlakySource {
    pub fn new(name: &str, failures: u32, mut inner: FixedSource) -> Self {
        inner.name = name.to_string();
        Self {
            failures,
            calls: AtomicU32::new(0),
            inner,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OpinionSource for FlakySource {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn review(&self, ctx: &TradeContext) -> Result<Opinion, OpinionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(OpinionError::Timeout(1));
        }
        self.inner.review(ctx).await
    }
}
