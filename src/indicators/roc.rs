// =============================================================================
// Rate of Change (ROC) — Momentum Indicator
// =============================================================================
//
//   ROC = ((close - close_n) / close_n) * 100
//
// The sign gives the direction; a 20 % move over the look-back reads as full
// strength.

use crate::indicators::{closes, emit};
use crate::market_data::PriceBar;
use crate::signals::Signal;
use crate::types::{Direction, Horizon};

const FULL_MOVE_PCT: f64 = 20.0;
const ROC_RELIABILITY: f64 = 0.6;

/// ROC series, one value per close starting at index `period`.
pub fn calculate_roc(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    (period..closes.len())
        .map(|i| {
            let prev = closes[i - period];
            if prev == 0.0 {
                0.0
            } else {
                (closes[i] - prev) / prev * 100.0
            }
        })
        .collect()
}

/// Most recent ROC value.
pub fn current_roc(closes: &[f64], period: usize) -> Option<f64> {
    calculate_roc(closes, period).last().copied()
}

/// `momentum:roc_<period>` on `horizon`. A zero ROC carries no direction.
pub fn roc_signal(instrument_id: &str, bars: &[PriceBar], period: usize, horizon: Horizon) -> Option<Signal> {
    let roc = current_roc(&closes(bars), period)?;
    if !roc.is_finite() || roc == 0.0 {
        return None;
    }
    let direction = if roc > 0.0 { Direction::Bullish } else { Direction::Bearish };

    emit(
        instrument_id,
        bars,
        format!("momentum:roc_{period}"),
        horizon,
        direction,
        roc.abs() / FULL_MOVE_PCT,
        ROC_RELIABILITY,
    )
}
