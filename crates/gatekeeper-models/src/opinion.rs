use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prediction::TradeSide;
use crate::threshold::Regime;

/// What an opinion source is asked to review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeContext {
    pub request_id: Uuid,
    pub instrument: String,
    pub side: TradeSide,
    pub prediction_value: Decimal,
    pub volatility: f64,
    pub regime: Regime,
    pub requested_at: DateTime<Utc>,
}

/// Reply parsed from an opinion source, before it is attributed to the source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpinionReply {
    pub approve: bool,
    /// 0 to 100.
    pub confidence: f64,
    /// 0 (no risk) to 10 (maximum risk).
    pub risk_score: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// One validator's verdict on a proposed trade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opinion {
    pub source: String,
    pub approve: bool,
    pub confidence: f64,
    pub risk_score: f64,
    pub reasoning: String,
}

impl Opinion {
    pub fn from_reply(source: impl Into<String>, reply: OpinionReply) -> Self {
        Self {
            source: source.into(),
            approve: reply.approve,
            confidence: reply.confidence,
            risk_score: reply.risk_score,
            reasoning: reply.reasoning,
        }
    }

    pub fn normalized_confidence(&self) -> f64 {
        (self.confidence / 100.0).clamp(0.0, 1.0)
    }

    pub fn risk_factor(&self) -> f64 {
        (10.0 - self.risk_score.clamp(0.0, 10.0)) / 10.0
    }

    /// normalizedConfidence x approvalIndicator x riskFactor, in [0, 1].
    pub fn contribution(&self) -> f64 {
        if !self.approve {
            return 0.0;
        }
        self.normalized_confidence() * self.risk_factor()
    }
}
