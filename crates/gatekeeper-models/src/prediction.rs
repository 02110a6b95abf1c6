use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::threshold::Regime;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A model prediction for one instrument, as fetched this cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub instrument: String,
    /// Signed predicted move. Positive = expect the price to rise.
    pub value: Decimal,
    /// When the prediction was produced upstream. None = source did not say.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// When this process received it.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Measured round-trip latency of the fetch, including retries.
    pub latency_ms: Option<u64>,
    /// Volatility reading reported alongside the prediction, if any.
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub regime: Option<Regime>,
}

impl Prediction {
    /// Trade direction implied by the predicted value. Zero predicts nothing.
    pub fn direction(&self) -> Option<TradeSide> {
        if self.value.is_zero() {
            None
        } else if self.value.is_sign_negative() {
            Some(TradeSide::Sell)
        } else {
            Some(TradeSide::Buy)
        }
    }
}

/// Wire shape returned by a prediction source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionReply {
    pub value: Decimal,
    #[serde(default)]
    pub source_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub regime: Option<Regime>,
}
