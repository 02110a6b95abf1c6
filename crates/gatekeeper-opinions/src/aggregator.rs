use gatekeeper_models::config::ValidationConfig;
use gatekeeper_models::opinion::Opinion;
use gatekeeper_models::validation::{
    SourceContribution, ValidationOutcome, ValidationScore, WeightTable,
};
use tracing::debug;

/// Weights for one configured source, in both tables.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceWeights {
    pub source: String,
    pub base: f64,
    pub high_volatility: f64,
}

/// Combines this cycle's opinions into one score. Holds only configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationAggregator {
    weights: Vec<SourceWeights>,
    high_volatility_cutoff: f64,
}

impl ValidationAggregator {
    pub fn new(weights: Vec<SourceWeights>, high_volatility_cutoff: f64) -> Self {
        Self {
            weights,
            high_volatility_cutoff,
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        let weights = config
            .sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| SourceWeights {
                source: s.name.clone(),
                base: s.weight_for(false),
                high_volatility: s.weight_for(true),
            })
            .collect();
        Self::new(weights, config.high_volatility_cutoff)
    }

    pub fn table_for(&self, volatility: f64) -> WeightTable {
        if volatility > self.high_volatility_cutoff {
            WeightTable::HighVolatility
        } else {
            WeightTable::Base
        }
    }

    fn weight_of(&self, source: &str, table: WeightTable) -> Option<f64> {
        self.weights.iter().find(|w| w.source == source).map(|w| match table {
            WeightTable::Base => w.base,
            WeightTable::HighVolatility => w.high_volatility,
        })
    }

    /// Weighted mean of contributions over the sources that answered.
    ///
    /// Silent sources are left out of both sums. Opinions from sources with no
    /// configured weight are ignored. No answering weight at all is `NoData`.
    pub fn aggregate(&self, opinions: &[Opinion], volatility: f64) -> ValidationOutcome {
        let table = self.table_for(volatility);

        let weighted: Vec<(&Opinion, f64)> = opinions
            .iter()
            .filter_map(|o| match self.weight_of(&o.source, table) {
                Some(w) if w > 0.0 => Some((o, w)),
                Some(_) => None,
                None => {
                    debug!(source = %o.source, "Ignoring opinion from unweighted source");
                    None
                }
            })
            .collect();

        let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
        if weighted.is_empty() || total_weight <= 0.0 {
            return ValidationOutcome::NoData;
        }

        let contributions: Vec<SourceContribution> = weighted
            .iter()
            .map(|(opinion, weight)| {
                let contribution = opinion.contribution();
                SourceContribution {
                    source: opinion.source.clone(),
                    weight: *weight,
                    contribution,
                    share: contribution * weight / total_weight,
                }
            })
            .collect();
        let score = contributions.iter().map(|c| c.share).sum::<f64>().clamp(0.0, 1.0);

        ValidationOutcome::Scored(ValidationScore {
            score,
            weight_table: table,
            contributions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opinion(source: &str, approve: bool, confidence: f64, risk_score: f64) -> Opinion {
        Opinion {
            source: source.to_string(),
            approve,
            confidence,
            risk_score,
            reasoning: String::new(),
        }
    }

    fn two_sources() -> ValidationAggregator {
        ValidationAggregator::new(
            vec![
                SourceWeights {
                    source: "a".to_string(),
                    base: 0.6,
                    high_volatility: 0.2,
                },
                SourceWeights {
                    source: "b".to_string(),
                    base: 0.4,
                    high_volatility: 0.8,
                },
            ],
            0.05,
        )
    }

    fn score(outcome: ValidationOutcome) -> ValidationScore {
        match outcome {
            ValidationOutcome::Scored(s) => s,
            ValidationOutcome::NoData => panic!("expected a score"),
        }
    }

    #[test]
    fn missing_source_is_excluded_not_zeroed() {
        let s = score(two_sources().aggregate(&[opinion("b", true, 50.0, 0.0)], 0.02));
        assert!((s.score - 0.5).abs() < 1e-12);
        assert_eq!(s.contributions.len(), 1);
    }

    #[test]
    fn no_opinions_is_no_data() {
        assert_eq!(two_sources().aggregate(&[], 0.02), ValidationOutcome::NoData);
    }

    #[test]
    fn unknown_sources_only_is_no_data() {
        let outcome = two_sources().aggregate(&[opinion("ghost", true, 100.0, 0.0)], 0.02);
        assert_eq!(outcome, ValidationOutcome::NoData);
    }

    #[test]
    fn alternate_table_above_cutoff() {
        let opinions = [opinion("a", true, 100.0, 0.0), opinion("b", false, 100.0, 0.0)];
        let calm = score(two_sources().aggregate(&opinions, 0.05));
        assert_eq!(calm.weight_table, WeightTable::Base);
        assert!((calm.score - 0.6).abs() < 1e-12);

        let wild = score(two_sources().aggregate(&opinions, 0.051));
        assert_eq!(wild.weight_table, WeightTable::HighVolatility);
        assert!((wild.score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn shares_sum_to_score() {
        let opinions = [opinion("a", true, 90.0, 3.0), opinion("b", true, 40.0, 7.0)];
        let s = score(two_sources().aggregate(&opinions, 0.0));
        let sum: f64 = s.contributions.iter().map(|c| c.share).sum();
        assert!((sum - s.score).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&s.score));
    }

    #[test]
    fn from_config_uses_enabled_sources() {
        let mut config = ValidationConfig::default();
        config.sources[1].enabled = false;
        let aggregator = ValidationAggregator::from_config(&config);
        assert_eq!(aggregator.weights.len(), 2);
        assert_eq!(aggregator.table_for(0.06), WeightTable::HighVolatility);
    }
}
