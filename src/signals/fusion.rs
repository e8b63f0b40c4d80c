// =============================================================================
// Confidence Fusion Engine — direction-partitioned signal aggregation
// =============================================================================
//
// For one instrument and one horizon:
//
//   1. Partition signals by direction.
//   2. weight(partition) = Σ strength × reliability
//   3. Winner = highest weight; ties broken by total reliability, then the
//      most recent computed_at, then declared neutral.
//   4. confidence = weight(winner) / Σ weight(all)   (0 and neutral if Σ = 0)
//   5. Contributors = winner's signals by descending strength × reliability.
//
// The result is always recomputed from the full signal set; nothing is
// patched incrementally, so the outcome never depends on arrival order.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::signals::signal::Signal;
use crate::types::{clamp_unit, Direction, Horizon};

/// Aggregate weight per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionWeights {
    pub bullish: f64,
    pub bearish: f64,
    pub neutral: f64,
}

impl DirectionWeights {
    pub fn total(&self) -> f64 {
        self.bullish + self.bearish + self.neutral
    }

    pub fn of(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Bullish => self.bullish,
            Direction::Bearish => self.bearish,
            Direction::Neutral => self.neutral,
        }
    }
}

/// The fused view of one instrument on one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedScore {
    pub instrument_id: String,
    pub horizon: Horizon,
    pub direction: Direction,
    pub confidence: f64,
    /// Confidence fell below the minimum-significance threshold.
    pub low_confidence: bool,
    pub weights: DirectionWeights,
    pub contributing_signals: Vec<Signal>,
    pub computed_at: DateTime<Utc>,
}

struct Partition<'a> {
    direction: Direction,
    weight: f64,
    reliability: f64,
    latest: Option<DateTime<Utc>>,
    members: Vec<&'a Signal>,
}

impl<'a> Partition<'a> {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            weight: 0.0,
            reliability: 0.0,
            latest: None,
            members: Vec::new(),
        }
    }

    fn push(&mut self, signal: &'a Signal) {
        self.weight += signal.weight();
        self.reliability += signal.reliability;
        self.latest = self.latest.max(Some(signal.computed_at));
        self.members.push(signal);
    }
}

pub struct FusionEngine {
    /// Scores below this confidence are flagged `low_confidence`.
    pub min_significance: f64,
}

impl FusionEngine {
    pub fn new(min_significance: f64) -> Self {
        Self { min_significance }
    }

    /// Fuse `signals` into exactly one score.
    ///
    /// `reference_time` is the data time the caller evaluates at; the score's
    /// `computed_at` is the later of it and the newest input signal.
    /// Signals for another horizon or instrument are dropped.
    pub fn fuse(
        &self,
        instrument_id: &str,
        horizon: Horizon,
        signals: &[Signal],
        reference_time: DateTime<Utc>,
    ) -> FusedScore {
        let mut partitions = [
            Partition::new(Direction::Bullish),
            Partition::new(Direction::Bearish),
            Partition::new(Direction::Neutral),
        ];

        let mut foreign = 0usize;
        let mut computed_at = reference_time;
        for signal in signals {
            if signal.horizon != horizon || signal.instrument_id != instrument_id {
                foreign += 1;
                continue;
            }
            computed_at = computed_at.max(signal.computed_at);
            let idx = match signal.direction {
                Direction::Bullish => 0,
                Direction::Bearish => 1,
                Direction::Neutral => 2,
            };
            partitions[idx].push(signal);
        }
        if foreign > 0 {
            warn!(
                symbol = %instrument_id,
                horizon = %horizon,
                dropped = foreign,
                "signals for another instrument/horizon dropped before fusion"
            );
        }

        let weights = DirectionWeights {
            bullish: partitions[0].weight,
            bearish: partitions[1].weight,
            neutral: partitions[2].weight,
        };
        let total = weights.total();

        if total <= 0.0 || !total.is_finite() {
            return FusedScore {
                instrument_id: instrument_id.to_string(),
                horizon,
                direction: Direction::Neutral,
                confidence: 0.0,
                low_confidence: true,
                weights,
                contributing_signals: Vec::new(),
                computed_at,
            };
        }

        let direction = pick_winner(&partitions);
        let mut contributors = partitions
            .iter()
            .find(|p| p.direction == direction)
            .map(|p| p.members.clone())
            .unwrap_or_default();

        let confidence = clamp_unit(weights.of(direction) / total);
        // Stable: equal contributions keep input order.
        contributors.sort_by(|a, b| b.weight().total_cmp(&a.weight()));

        FusedScore {
            instrument_id: instrument_id.to_string(),
            horizon,
            direction,
            confidence,
            low_confidence: confidence < self.min_significance,
            weights,
            contributing_signals: contributors.into_iter().cloned().collect(),
            computed_at,
        }
    }
}

/// Winning direction: weight, then reliability, then recency, else neutral.
fn pick_winner(partitions: &[Partition<'_>]) -> Direction {
    let top_weight = partitions
        .iter()
        .map(|p| p.weight)
        .fold(f64::NEG_INFINITY, f64::max);
    let tied: Vec<&Partition<'_>> = partitions.iter().filter(|p| p.weight == top_weight).collect();
    if let [only] = tied.as_slice() {
        return only.direction;
    }

    let top_reliability = tied
        .iter()
        .map(|p| p.reliability)
        .fold(f64::NEG_INFINITY, f64::max);
    let tied: Vec<&Partition<'_>> = tied
        .into_iter()
        .filter(|p| p.reliability == top_reliability)
        .collect();
    if let [only] = tied.as_slice() {
        return only.direction;
    }

    let newest = tied.iter().map(|p| p.latest).max().flatten();
    let tied: Vec<&Partition<'_>> = tied.into_iter().filter(|p| p.latest == newest).collect();
    if let [only] = tied.as_slice() {
        return only.direction;
    }

    Direction::Neutral
}
