use std::sync::Arc;

use gatekeeper_models::config::ThresholdConfig;
use gatekeeper_models::threshold::{
    AdaptiveThreshold, AdjustmentStep, HistoricalInput, ThresholdAdjustment, ThresholdContext,
};
use gatekeeper_store::TradeHistory;
use tracing::{debug, warn};

/// Compute the acceptance bar from explicit inputs only.
///
/// Steps run in a fixed order: base, volatility, historical performance,
/// regime, clamp. Every step leaves an entry in `adjustments`; a skipped step
/// has `delta: None`.
pub fn compute(
    config: &ThresholdConfig,
    ctx: &ThresholdContext,
    history: &HistoricalInput,
) -> AdaptiveThreshold {
    let mut running = config.base;
    let mut adjustments = Vec::with_capacity(4);

    let volatility = volatility_adjustment(config, ctx.volatility);
    running += volatility.delta.unwrap_or(0.0);
    adjustments.push(volatility);

    let historical = historical_adjustment(config, history);
    running += historical.delta.unwrap_or(0.0);
    adjustments.push(historical);

    let offset = config.regime_offsets.offset(ctx.regime);
    running += offset;
    adjustments.push(ThresholdAdjustment {
        step: AdjustmentStep::Regime,
        delta: Some(offset),
        note: format!("regime {:?}", ctx.regime),
    });

    let unclamped = running;
    // f64::clamp panics when min > max.
    let value = unclamped.max(config.min_bound).min(config.max_bound);
    adjustments.push(ThresholdAdjustment {
        step: AdjustmentStep::Clamp,
        delta: Some(value - unclamped),
        note: format!("bounds [{}, {}]", config.min_bound, config.max_bound),
    });

    AdaptiveThreshold {
        value,
        base: config.base,
        unclamped,
        min_bound: config.min_bound,
        max_bound: config.max_bound,
        adjustments,
    }
}

/// Positive (stricter) when calm, negative (looser) when volatile,
/// linear in between.
fn volatility_adjustment(config: &ThresholdConfig, volatility: f64) -> ThresholdAdjustment {
    let step = AdjustmentStep::Volatility;
    if !volatility.is_finite() {
        return ThresholdAdjustment {
            step,
            delta: None,
            note: "volatility reading not usable".to_string(),
        };
    }

    let low = config.low_volatility_cutoff;
    let high = config.high_volatility_cutoff;
    let (delta, note) = if volatility <= low {
        (config.low_volatility_delta, format!("{volatility} <= low cutoff {low}"))
    } else if volatility >= high {
        (-config.high_volatility_delta, format!("{volatility} >= high cutoff {high}"))
    } else {
        let t = (volatility - low) / (high - low);
        let delta = config.low_volatility_delta
            + t * (-config.high_volatility_delta - config.low_volatility_delta);
        (delta, format!("{volatility} interpolated between {low} and {high}"))
    };

    ThresholdAdjustment {
        step,
        delta: Some(delta),
        note,
    }
}

fn historical_adjustment(config: &ThresholdConfig, history: &HistoricalInput) -> ThresholdAdjustment {
    let step = AdjustmentStep::HistoricalPerformance;
    let window = match history {
        HistoricalInput::Unavailable { reason } => {
            return ThresholdAdjustment {
                step,
                delta: None,
                note: format!("history unavailable: {reason}"),
            };
        }
        HistoricalInput::Available(window) => window,
    };

    let mean = match window.mean_return {
        Some(mean) if window.trade_count >= config.min_sample_size => mean,
        _ => {
            return ThresholdAdjustment {
                step,
                delta: None,
                note: format!(
                    "{} trades in {}d < minimum {}",
                    window.trade_count, window.window_days, config.min_sample_size
                ),
            };
        }
    };

    let delta = if mean > config.good_return_cutoff {
        -config.performance_delta
    } else if mean < config.poor_return_cutoff {
        config.performance_delta
    } else {
        0.0
    };
    ThresholdAdjustment {
        step,
        delta: Some(delta),
        note: format!(
            "mean return {mean:.4} over {} trades in {}d",
            window.trade_count, window.window_days
        ),
    }
}

/// Threshold calculator wired to the historical trade store.
pub struct ThresholdCalculator {
    config: ThresholdConfig,
    history: Arc<dyn TradeHistory>,
}

impl ThresholdCalculator {
    pub fn new(config: ThresholdConfig, history: Arc<dyn TradeHistory>) -> Self {
        Self { config, history }
    }

    /// Never fails: an unreachable history store only drops the historical step.
    pub async fn calculate(&self, ctx: &ThresholdContext) -> AdaptiveThreshold {
        let history = match self
            .history
            .trailing_performance(&ctx.instrument, self.config.history_window_days)
            .await
        {
            Ok(window) => HistoricalInput::Available(window),
            Err(e) => {
                warn!(instrument = %ctx.instrument, error = %e, "Historical store unavailable, skipping performance adjustment");
                HistoricalInput::Unavailable {
                    reason: e.to_string(),
                }
            }
        };

        let threshold = compute(&self.config, ctx, &history);
        debug!(
            instrument = %ctx.instrument,
            threshold = threshold.value,
            unclamped = threshold.unclamped,
            "Computed threshold"
        );
        threshold
    }
}
