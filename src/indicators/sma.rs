// =============================================================================
// Simple Moving Average (SMA) crossover
// =============================================================================
//
// The fast SMA above the slow SMA reads bullish, below reads bearish. The
// spread between them (relative to slow) gives the base strength; a cross
// within the last `recency` bars adds a fixed boost.
// =============================================================================

use crate::indicators::{closes, emit};
use crate::market_data::PriceBar;
use crate::signals::Signal;
use crate::types::{Direction, Horizon};

const FULL_SPREAD: f64 = 0.05;
const SPREAD_SHARE: f64 = 0.6;
const FRESH_CROSS_BOOST: f64 = 0.4;
const CROSS_RELIABILITY: f64 = 0.7;

/// Rolling SMA; element `i` covers closes `i ..= i + period - 1`.
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }
    let mut sum: f64 = closes[..period].iter().sum();
    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sum / period as f64);
    for i in period..closes.len() {
        sum += closes[i] - closes[i - period];
        result.push(sum / period as f64);
    }
    result
}

/// Bars since the fast series last crossed the slow one (0 = on the last bar).
/// Both series are aligned at their ends. `None` if no cross is visible.
pub fn bars_since_cross(fast: &[f64], slow: &[f64]) -> Option<usize> {
    let n = fast.len().min(slow.len());
    let fast = &fast[fast.len() - n..];
    let slow = &slow[slow.len() - n..];
    let diffs: Vec<f64> = fast.iter().zip(slow).map(|(f, s)| f - s).collect();

    diffs.windows(2).rev().position(|w| {
        (w[0] <= 0.0 && w[1] > 0.0) || (w[0] >= 0.0 && w[1] < 0.0)
    })
}

/// `trend:ma_cross_<fast>_<slow>` on `horizon`.
pub fn ma_cross_signal(
    instrument_id: &str,
    bars: &[PriceBar],
    fast: usize,
    slow: usize,
    recency: usize,
    horizon: Horizon,
) -> Option<Signal> {
    let closes = closes(bars);
    let fast_sma = calculate_sma(&closes, fast);
    let slow_sma = calculate_sma(&closes, slow);
    let f = *fast_sma.last()?;
    let s = *slow_sma.last()?;
    if s == 0.0 {
        return None;
    }

    let direction = if f > s {
        Direction::Bullish
    } else if f < s {
        Direction::Bearish
    } else {
        return None;
    };

    let spread = ((f - s).abs() / s.abs() / FULL_SPREAD).min(1.0);
    let fresh = bars_since_cross(&fast_sma, &slow_sma).is_some_and(|age| age < recency);
    let strength = spread * SPREAD_SHARE + if fresh { FRESH_CROSS_BOOST } else { 0.0 };

    emit(
        instrument_id,
        bars,
        format!("trend:ma_cross_{fast}_{slow}"),
        horizon,
        direction,
        strength,
        CROSS_RELIABILITY,
    )
}
