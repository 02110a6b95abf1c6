use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gatekeeper_models::config::FreshnessConfig;
use gatekeeper_models::decision::{FreshnessReport, FreshnessVerdict};
use gatekeeper_models::prediction::Prediction;
use gatekeeper_models::state::FreshnessCounters;

/// Classify a prediction by age and fetch latency.
///
/// `age > max_age` is STALE whatever else is true. Otherwise `age >= warn`
/// marks it DELAYED and `latency > max_api_latency` marks it SLOW; both flags
/// are kept on the report and DELAYED wins the verdict. Missing source
/// timestamp is UNKNOWN.
pub fn classify(
    config: &FreshnessConfig,
    prediction: &Prediction,
    now: DateTime<Utc>,
) -> FreshnessReport {
    let latency_ms = prediction.latency_ms;
    let slow = latency_ms.is_some_and(|l| l > config.max_api_latency_ms);

    let Some(source_timestamp) = prediction.source_timestamp else {
        return FreshnessReport {
            verdict: FreshnessVerdict::Unknown,
            score: 0.0,
            age_ms: None,
            latency_ms,
            delayed: false,
            slow,
        };
    };

    // Clock skew can put the source slightly in the future; that is age 0.
    let age_ms = (now - source_timestamp).num_milliseconds().max(0);
    let max_age_ms = (config.max_age_seconds as i64).saturating_mul(1_000);
    let warn_ms = (config.warn_threshold_seconds as i64).saturating_mul(1_000);

    let score = if max_age_ms > 0 {
        (1.0 - age_ms as f64 / max_age_ms as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    if age_ms > max_age_ms {
        return FreshnessReport {
            verdict: FreshnessVerdict::Stale,
            score: 0.0,
            age_ms: Some(age_ms),
            latency_ms,
            delayed: true,
            slow,
        };
    }

    let delayed = age_ms >= warn_ms;
    let verdict = if delayed {
        FreshnessVerdict::Delayed
    } else if slow {
        FreshnessVerdict::Slow
    } else {
        FreshnessVerdict::Fresh
    };

    FreshnessReport {
        verdict,
        score,
        age_ms: Some(age_ms),
        latency_ms,
        delayed,
        slow,
    }
}

/// Freshness Gate with per-instrument counters.
#[derive(Debug, Clone)]
pub struct FreshnessGate {
    config: FreshnessConfig,
}

impl FreshnessGate {
    pub fn new(config: FreshnessConfig) -> Self {
        Self { config }
    }

    /// Classify and bump the instrument's counters. Returns the report and
    /// whether any counter moved.
    pub fn check(
        &self,
        prediction: &Prediction,
        now: DateTime<Utc>,
        counters: &mut BTreeMap<String, FreshnessCounters>,
    ) -> (FreshnessReport, bool) {
        let report = classify(&self.config, prediction, now);
        let entry = counters.entry(prediction.instrument.clone()).or_default();
        let before = entry.clone();

        match report.verdict {
            FreshnessVerdict::Stale => entry.stale += 1,
            FreshnessVerdict::Unknown => entry.unknown += 1,
            _ => {
                if report.delayed {
                    entry.delayed += 1;
                }
            }
        }
        if report.slow {
            entry.slow += 1;
        }

        let changed = *entry != before;
        if !changed && *entry == FreshnessCounters::default() {
            counters.remove(&prediction.instrument);
        }
        (report, changed)
    }
}
