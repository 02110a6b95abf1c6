use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prediction::TradeSide;
use crate::state::Mode;
use crate::threshold::AdaptiveThreshold;
use crate::validation::ValidationScore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessVerdict {
    Fresh,
    /// Older than the warn threshold but within max age.
    Delayed,
    /// Fetch latency exceeded the API budget.
    Slow,
    Stale,
    /// Timestamp metadata was missing.
    Unknown,
}

/// Freshness Gate output for one prediction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FreshnessReport {
    pub verdict: FreshnessVerdict,
    /// 1.0 = just arrived, 0.0 = at or past max age.
    pub score: f64,
    pub age_ms: Option<i64>,
    pub latency_ms: Option<u64>,
    pub delayed: bool,
    pub slow: bool,
}

impl FreshnessReport {
    /// Whether a decision may be accepted on this prediction at all.
    pub fn is_usable(&self) -> bool {
        !matches!(
            self.verdict,
            FreshnessVerdict::Stale | FreshnessVerdict::Unknown
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Stale,
    UnknownFreshness,
    BelowThreshold,
    Standby,
    InstrumentInactive,
    NoDirection,
}

/// Outcome of evaluating one instrument in one cycle. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: Uuid,
    pub instrument: String,
    pub accepted: bool,
    pub prediction_value: Decimal,
    pub score: Option<ValidationScore>,
    pub threshold: Option<AdaptiveThreshold>,
    pub freshness: FreshnessReport,
    pub mode: Mode,
    pub rejection: Option<RejectionReason>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn score_value(&self) -> Option<f64> {
        self.score.as_ref().map(|s| s.score)
    }

    pub fn threshold_value(&self) -> Option<f64> {
        self.threshold.as_ref().map(|t| t.value)
    }
}

/// Hand-off to the execution collaborator for an accepted decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOrder {
    pub decision_id: Uuid,
    pub instrument: String,
    pub side: TradeSide,
    /// Fraction of capital to commit, 0.0 to the configured maximum.
    pub size_fraction: f64,
    pub score: f64,
    pub threshold: f64,
    pub prediction_value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(verdict: FreshnessVerdict) -> FreshnessReport {
        FreshnessReport {
            verdict,
            score: 0.5,
            age_ms: Some(15_000),
            latency_ms: Some(200),
            delayed: verdict == FreshnessVerdict::Delayed,
            slow: false,
        }
    }

    #[test]
    fn stale_and_unknown_are_unusable() {
        assert!(report(FreshnessVerdict::Fresh).is_usable());
        assert!(report(FreshnessVerdict::Delayed).is_usable());
        assert!(report(FreshnessVerdict::Slow).is_usable());
        assert!(!report(FreshnessVerdict::Stale).is_usable());
        assert!(!report(FreshnessVerdict::Unknown).is_usable());
    }

    #[test]
    fn rejection_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&RejectionReason::UnknownFreshness).unwrap(),
            "\"unknown_freshness\""
        );
    }
}
