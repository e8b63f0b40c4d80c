// =============================================================================
// Sentiment Aggregator — half-life decayed news sentiment
// =============================================================================
//
// Each qualifying news item contributes with
//
//   weight = source_weight × 0.5^(age / half_life)
//
// and the aggregate is the weighted mean of raw scores, clamped to [-1, 1].
// Reliability grows with the total decayed weight mass and saturates:
//
//   reliability = 1 - exp(-mass / saturation_mass)
//
// Items older than the decay window, newer than the evaluation time, or with
// out-of-range fields do not qualify. No qualifying items => no signal.
// =============================================================================

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::EngineError;
use crate::market_data::NewsItem;
use crate::runtime_config::SentimentParams;
use crate::signals::signal::Signal;
use crate::types::{Direction, Horizon};

pub const SENTIMENT_SIGNAL: &str = "sentiment:news";

/// Exponential decay factor for an item `age_hours` old.
pub fn decay_factor(age_hours: f64, half_life_hours: f64) -> f64 {
    (-age_hours * std::f64::consts::LN_2 / half_life_hours).exp()
}

/// Reduce an instrument's news into at most one short-horizon signal.
pub fn aggregate(
    instrument_id: &str,
    items: &[NewsItem],
    as_of: DateTime<Utc>,
    params: &SentimentParams,
) -> Result<Signal, EngineError> {
    let mut mass = 0.0;
    let mut weighted_sum = 0.0;
    let mut newest: Option<DateTime<Utc>> = None;
    let mut qualifying = 0usize;

    for item in items.iter().filter(|n| n.instrument_id == instrument_id) {
        if !item.is_well_formed() {
            warn!(
                symbol = %instrument_id,
                timestamp = %item.timestamp,
                score = item.raw_sentiment_score,
                source_weight = item.source_weight,
                "malformed news item skipped"
            );
            continue;
        }
        let age_hours = (as_of - item.timestamp).num_seconds() as f64 / 3600.0;
        if age_hours < 0.0 || age_hours > params.window_hours {
            continue;
        }

        let weight = item.source_weight * decay_factor(age_hours, params.half_life_hours);
        mass += weight;
        weighted_sum += weight * item.raw_sentiment_score;
        newest = newest.max(Some(item.timestamp));
        qualifying += 1;
    }

    let Some(computed_at) = newest else {
        return Err(EngineError::insufficient(SENTIMENT_SIGNAL, 1, 0));
    };
    if mass <= 0.0 {
        return Err(EngineError::insufficient(SENTIMENT_SIGNAL, 1, 0));
    }

    let aggregate = (weighted_sum / mass).clamp(-1.0, 1.0);
    let direction = if aggregate.abs() < params.neutral_epsilon {
        Direction::Neutral
    } else if aggregate > 0.0 {
        Direction::Bullish
    } else {
        Direction::Bearish
    };
    let reliability = 1.0 - (-mass / params.saturation_mass).exp();

    tracing::debug!(
        symbol = %instrument_id,
        items = qualifying,
        aggregate,
        mass,
        direction = %direction,
        "sentiment aggregated"
    );

    Ok(Signal::new(
        instrument_id,
        SENTIMENT_SIGNAL,
        Horizon::Short,
        direction,
        aggregate.abs(),
        reliability,
        computed_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::news::tests::news;
    use crate::market_data::series::tests::day;

    fn params() -> SentimentParams {
        SentimentParams {
            half_life_hours: 24.0,
            window_hours: 168.0,
            neutral_epsilon: 0.05,
            saturation_mass: 3.0,
        }
    }

    #[test]
    fn decay_halves_at_half_life() {
        assert!((decay_factor(24.0, 24.0) - 0.5).abs() < 1e-12);
        assert!((decay_factor(0.0, 24.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weighted_by_source_and_age() {
        // Fresh +0.8 at weight 1.0; one-day-old -0.4 at weight 1.0 (decayed to 0.5).
        let items = vec![news("X", 10, 0.8, 1.0), news("X", 9, -0.4, 1.0)];
        let s = aggregate("X", &items, day(10), &params()).unwrap();
        let expected = (0.8 * 1.0 + (-0.4) * 0.5) / 1.5;
        assert_eq!(s.direction, Direction::Bullish);
        assert!((s.strength - expected).abs() < 1e-9);
        assert_eq!(s.horizon, Horizon::Short);
        assert_eq!(s.computed_at, day(10));
        assert_eq!(s.name, SENTIMENT_SIGNAL);
    }

    #[test]
    fn all_items_outside_window_yield_no_signal() {
        let items = vec![news("X", 0, 0.9, 1.0), news("X", 1, 0.9, 1.0)];
        let err = aggregate("X", &items, day(30), &params()).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }

    #[test]
    fn empty_input_yields_no_signal() {
        assert!(aggregate("X", &[], day(1), &params()).is_err());
    }

    #[test]
    fn small_aggregate_is_neutral() {
        let items = vec![news("X", 10, 0.03, 1.0)];
        let s = aggregate("X", &items, day(10), &params()).unwrap();
        assert_eq!(s.direction, Direction::Neutral);
    }

    #[test]
    fn negative_aggregate_is_bearish() {
        let items = vec![news("X", 10, -0.6, 0.5)];
        let s = aggregate("X", &items, day(10), &params()).unwrap();
        assert_eq!(s.direction, Direction::Bearish);
        assert!((s.strength - 0.6).abs() < 1e-12);
    }

    #[test]
    fn reliability_grows_and_saturates() {
        let one = aggregate("X", &[news("X", 10, 0.5, 1.0)], day(10), &params()).unwrap();
        let many: Vec<NewsItem> = (0..50)
            .map(|i| {
                let mut n = news("X", 10, 0.5, 1.0);
                n.headline = Some(format!("story {i}"));
                n
            })
            .collect();
        let lots = aggregate("X", &many, day(10), &params()).unwrap();
        assert!(lots.reliability > one.reliability);
        assert!(lots.reliability <= 1.0);
    }

    #[test]
    fn future_and_malformed_items_ignored() {
        let items = vec![news("X", 12, 0.9, 1.0), news("X", 10, 3.0, 1.0)];
        assert!(aggregate("X", &items, day(10), &params()).is_err());
    }
}
