use serde::{Deserialize, Serialize};

/// Which weight table was in force for a score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WeightTable {
    Base,
    HighVolatility,
}

/// One responding source's share of a validation score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceContribution {
    pub source: String,
    pub weight: f64,
    /// Unweighted contribution in [0, 1].
    pub contribution: f64,
    /// contribution x weight / total responding weight.
    pub share: f64,
}

/// Weighted aggregate of this cycle's opinions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationScore {
    /// 0.0 to 1.0.
    pub score: f64,
    pub weight_table: WeightTable,
    pub contributions: Vec<SourceContribution>,
}

/// Result of aggregation. `NoData` is never a low score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Scored(ValidationScore),
    NoData,
}
