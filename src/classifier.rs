// =============================================================================
// Opportunity / Recommendation Classifier
// =============================================================================
//
// Maps one fused score onto a discrete category:
//
//   short  ∧ confidence ≥ golden   ∧ not neutral  => golden_opportunity
//   medium/long ∧ confidence ≥ buy_sell ∧ bullish => buy
//   medium/long ∧ confidence ≥ buy_sell ∧ bearish => sell
//   neutral ∧ confidence ≥ min_significance       => hold
//   anything else                                  => none
//
// Every classification owns the exact score it was derived from, a short
// human-readable rationale built from the top contributing signals, and a
// coarse confidence level (high at the golden threshold, medium at buy/sell)
// with the risk that goes with it.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::runtime_config::EngineConfig;
use crate::signals::FusedScore;
use crate::types::{Category, ConfidenceLevel, Direction, Horizon, RiskLevel};

pub const INSUFFICIENT_DATA: &str = "insufficient data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub instrument_id: String,
    pub category: Category,
    pub score: FusedScore,
    pub rationale: Vec<String>,
    pub confidence_level: ConfidenceLevel,
    pub risk_level: RiskLevel,
}

impl Classification {
    pub fn horizon(&self) -> Horizon {
        self.score.horizon
    }

    pub fn confidence(&self) -> f64 {
        self.score.confidence
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    pub golden_threshold: f64,
    pub buy_sell_threshold: f64,
    pub min_significance: f64,
    /// Contributors listed in the rationale.
    pub top_n: usize,
}

impl Classifier {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            golden_threshold: config.thresholds.golden_threshold,
            buy_sell_threshold: config.thresholds.buy_sell_threshold,
            min_significance: config.thresholds.min_significance,
            top_n: config.rationale_top_n,
        }
    }

    pub fn classify(&self, score: FusedScore) -> Classification {
        let category = self.category_for(&score);
        let rationale = self.rationale_for(&score);
        let confidence_level = ConfidenceLevel::from_confidence(
            score.confidence,
            self.golden_threshold,
            self.buy_sell_threshold,
        );
        Classification {
            instrument_id: score.instrument_id.clone(),
            category,
            score,
            rationale,
            confidence_level,
            risk_level: confidence_level.risk(),
        }
    }

    fn category_for(&self, score: &FusedScore) -> Category {
        let c = score.confidence;
        match (score.horizon, score.direction) {
            (Horizon::Short, Direction::Bullish | Direction::Bearish) if c >= self.golden_threshold => {
                Category::GoldenOpportunity
            }
            (Horizon::Medium | Horizon::Long, Direction::Bullish) if c >= self.buy_sell_threshold => {
                Category::Buy
            }
            (Horizon::Medium | Horizon::Long, Direction::Bearish) if c >= self.buy_sell_threshold => {
                Category::Sell
            }
            (_, Direction::Neutral) if c >= self.min_significance => Category::Hold,
            _ => Category::None,
        }
    }

    fn rationale_for(&self, score: &FusedScore) -> Vec<String> {
        if !score.contributing_signals.is_empty() {
            return score
                .contributing_signals
                .iter()
                .take(self.top_n.max(1))
                .map(|s| format!("{}: strength {:.2}", s.name, s.strength))
                .collect();
        }

        let w = &score.weights;
        if w.total() <= 0.0 {
            return vec![INSUFFICIENT_DATA.to_string()];
        }
        vec![format!(
            "no dominant direction (bullish {:.2}, bearish {:.2}, neutral {:.2})",
            w.bullish, w.bearish, w.neutral
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::series::tests::day;
    use crate::runtime_config::tests::test_config;
    use crate::signals::signal::tests::sig;
    use crate::signals::FusionEngine;

    fn classifier() -> Classifier {
        Classifier::from_config(&test_config())
    }

    fn fuse(horizon: Horizon, signals: &[crate::signals::Signal]) -> FusedScore {
        FusionEngine::new(0.35).fuse("2222.SR", horizon, signals, day(10))
    }

    #[test]
    fn golden_opportunity_scenario() {
        let signals = vec![
            sig("candlestick:hammer", Horizon::Short, Direction::Bullish, 0.8, 0.9),
            sig("breakout:20bar", Horizon::Short, Direction::Bullish, 0.6, 0.7),
            sig("momentum:rsi", Horizon::Short, Direction::Bullish, 0.3, 0.5),
            sig("sentiment:news", Horizon::Short, Direction::Bearish, 0.9, 0.4),
        ];
        let c = classifier().classify(fuse(Horizon::Short, &signals));
        assert_eq!(c.category, Category::GoldenOpportunity);
        assert!((c.confidence() - 0.782).abs() < 1e-3);
        assert_eq!(c.confidence_level, ConfidenceLevel::High);
        assert_eq!(c.risk_level, RiskLevel::LowToMedium);
        assert_eq!(
            c.rationale,
            vec![
                "candlestick:hammer: strength 0.80",
                "breakout:20bar: strength 0.60",
                "momentum:rsi: strength 0.30",
            ]
        );
    }

    #[test]
    fn empty_set_is_none_with_insufficient_data() {
        let c = classifier().classify(fuse(Horizon::Medium, &[]));
        assert_eq!(c.category, Category::None);
        assert_eq!(c.score.confidence, 0.0);
        assert_eq!(c.rationale, vec![INSUFFICIENT_DATA]);
        assert_eq!(c.risk_level, RiskLevel::High);
    }

    #[test]
    fn medium_horizon_buy_and_sell() {
        let buy = classifier().classify(fuse(
            Horizon::Medium,
            &[sig("trend:ema_stack", Horizon::Medium, Direction::Bullish, 0.7, 0.8)],
        ));
        assert_eq!(buy.category, Category::Buy);

        let sell = classifier().classify(fuse(
            Horizon::Long,
            &[
                sig("trend:ma_cross_50_200", Horizon::Long, Direction::Bearish, 0.8, 0.9),
                sig("momentum:roc_120", Horizon::Long, Direction::Bullish, 0.2, 0.5),
            ],
        ));
        assert_eq!(sell.category, Category::Sell);
    }

    #[test]
    fn short_horizon_below_golden_is_none() {
        let c = classifier().classify(fuse(
            Horizon::Short,
            &[
                sig("breakout:20bar", Horizon::Short, Direction::Bullish, 0.7, 0.9),
                sig("momentum:rsi", Horizon::Short, Direction::Bearish, 0.5, 0.6),
            ],
        ));
        // 0.63 / 0.93 is below the golden threshold.
        assert_eq!(c.category, Category::None);
        assert_eq!(c.confidence_level, ConfidenceLevel::Medium);
        assert_eq!(c.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn confident_neutral_is_hold() {
        let c = classifier().classify(fuse(
            Horizon::Medium,
            &[sig("momentum:roc_20", Horizon::Medium, Direction::Neutral, 0.5, 0.8)],
        ));
        assert_eq!(c.category, Category::Hold);
    }

    #[test]
    fn unresolved_tie_reports_partition_weights() {
        // Equal weight, reliability and time on both sides.
        let bull = sig("trend:ema_stack", Horizon::Medium, Direction::Bullish, 0.5, 0.8);
        let bear = sig("momentum:roc_20", Horizon::Medium, Direction::Bearish, 0.5, 0.8);
        let c = classifier().classify(fuse(Horizon::Medium, &[bull, bear]));
        assert_eq!(c.score.direction, Direction::Neutral);
        assert_eq!(c.category, Category::None);
        assert_eq!(
            c.rationale,
            vec!["no dominant direction (bullish 0.40, bearish 0.40, neutral 0.00)"]
        );
    }

    #[test]
    fn rationale_limited_to_top_n() {
        let mut cls = classifier();
        cls.top_n = 1;
        let signals = vec![
            sig("trend:ema_stack", Horizon::Medium, Direction::Bullish, 0.9, 0.9),
            sig("momentum:roc_20", Horizon::Medium, Direction::Bullish, 0.4, 0.9),
        ];
        let c = cls.classify(fuse(Horizon::Medium, &signals));
        assert_eq!(c.rationale, vec!["trend:ema_stack: strength 0.90"]);
    }
}
