//! Scripted collaborators for driving the decision loop in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use gatekeeper_models::decision::ExecutionOrder;
use gatekeeper_models::prediction::PredictionReply;
use gatekeeper_models::threshold::{PerformanceWindow, Regime};
use gatekeeper_store::{StoreError, TradeHistory};
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::sources::{ExecutionEngine, PredictionSource};

/// Predictions keyed by instrument; unknown instruments error.
#[derive(Default)]
pub struct ScriptedPredictions {
    replies: Mutex<HashMap<String, PredictionReply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPredictions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A prediction stamped now, with a normal regime.
    pub fn fresh(self, instrument: &str, value: Decimal, volatility: f64) -> Self {
        self.set(
            instrument,
            PredictionReply {
                value,
                source_timestamp: Some(Utc::now()),
                volatility: Some(volatility),
                regime: Some(Regime::Normal),
            },
        );
        self
    }

    /// A prediction produced `age_secs` before this call.
    pub fn aged(self, instrument: &str, value: Decimal, age_secs: i64) -> Self {
        self.set(
            instrument,
            PredictionReply {
                value,
                source_timestamp: Some(Utc::now() - Duration::seconds(age_secs)),
                volatility: Some(0.03),
                regime: None,
            },
        );
        self
    }

    pub fn set(&self, instrument: &str, reply: PredictionReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.insert(instrument.to_string(), reply);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PredictionSource for ScriptedPredictions {
    async fn fetch(&self, instrument: &str) -> Result<PredictionReply, EngineError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(instrument.to_string());
        }
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|r| r.get(instrument).cloned());
        reply.ok_or_else(|| EngineError::Prediction(format!("no prediction for {instrument}")))
    }
}

/// Keeps every submitted order; optionally rejects them all.
#[derive(Default)]
pub struct RecordingExecution {
    orders: Mutex<Vec<ExecutionOrder>>,
    fail: bool,
}

impl RecordingExecution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn orders(&self) -> Vec<ExecutionOrder> {
        self.orders.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ExecutionEngine for RecordingExecution {
    fn name(&self) -> &str {
        "recording"
    }

    async fn submit(&self, order: &ExecutionOrder) -> Result<(), EngineError> {
        if let Ok(mut orders) = self.orders.lock() {
            orders.push(order.clone());
        }
        if self.fail {
            return Err(EngineError::Execution("exchange rejected order".to_string()));
        }
        Ok(())
    }
}

/// Trade history that returns one fixed answer for every instrument.
pub struct StaticHistory {
    answer: Result<(u64, Option<f64>), String>,
}

impl StaticHistory {
    pub fn window(trade_count: u64, mean_return: f64) -> Self {
        Self {
            answer: Ok((trade_count, Some(mean_return))),
        }
    }

    pub fn empty() -> Self {
        Self {
            answer: Ok((0, None)),
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            answer: Err(reason.to_string()),
        }
    }
}

#[async_trait]
impl TradeHistory for StaticHistory {
    async fn trailing_performance(
        &self,
        instrument: &str,
        window_days: u32,
    ) -> Result<PerformanceWindow, StoreError> {
        match &self.answer {
            Ok((trade_count, mean_return)) => Ok(PerformanceWindow {
                instrument: instrument.to_string(),
                window_days,
                trade_count: *trade_count,
                mean_return: *mean_return,
            }),
            Err(reason) => Err(StoreError::Unavailable(reason.clone())),
        }
    }
}
