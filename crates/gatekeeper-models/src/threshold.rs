use serde::{Deserialize, Serialize};

/// Qualitative market-condition label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Trending,
    Sideways,
    HighVolatility,
    #[default]
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdContext {
    pub instrument: String,
    pub volatility: f64,
    pub regime: Regime,
}

/// Trailing-window aggregate from the historical trade store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceWindow {
    pub instrument: String,
    pub window_days: u32,
    pub trade_count: u64,
    /// None when no trades closed inside the window.
    pub mean_return: Option<f64>,
}

/// Historical input to the threshold calculation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HistoricalInput {
    Available(PerformanceWindow),
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStep {
    Volatility,
    HistoricalPerformance,
    Regime,
    Clamp,
}

/// One step of the threshold procedure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdAdjustment {
    pub step: AdjustmentStep,
    /// None = step skipped; Some(0.0) = step ran and found nothing to change.
    pub delta: Option<f64>,
    pub note: String,
}

/// Acceptance bar for one instrument, with its audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveThreshold {
    pub value: f64,
    pub base: f64,
    /// Running total before clamping.
    pub unclamped: f64,
    pub min_bound: f64,
    pub max_bound: f64,
    pub adjustments: Vec<ThresholdAdjustment>,
}

impl AdaptiveThreshold {
    pub fn adjustment(&self, step: AdjustmentStep) -> Option<&ThresholdAdjustment> {
        self.adjustments.iter().find(|a| a.step == step)
    }

    pub fn was_clamped(&self) -> bool {
        self.value != self.unclamped
    }
}
