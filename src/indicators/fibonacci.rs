// =============================================================================
// Fibonacci Retracement
// =============================================================================
//
// Within the last `lookback` bars, the highest high and lowest low form the
// swing. If the swing is at least `min_swing_pct` of the low, retracement
// levels are drawn at 23.6 / 38.2 / 50 / 61.8 / 78.6 % of it, measured from
// the swing's end back towards its start.
//
// The indicator fires when the last close crosses one or more levels
// relative to the previous close: crossing upward is bullish, downward is
// bearish. Strength is inversely proportional to the distance from the close
// to the nearest level it has not yet reached in the direction of travel
// (the swing extreme when no level is left).
// =============================================================================

use crate::indicators::emit;
use crate::market_data::PriceBar;
use crate::runtime_config::IndicatorParams;
use crate::signals::Signal;
use crate::types::{Direction, Horizon};

pub const RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

const RETRACEMENT_RELIABILITY: f64 = 0.55;
/// Distance (as a share of the swing) at which strength halves.
const HALF_STRENGTH_DISTANCE: f64 = 0.1;

/// A swing and the retracement levels drawn on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Retracement {
    pub swing_high: f64,
    pub swing_low: f64,
    /// True when the low came before the high (an up-swing).
    pub upswing: bool,
    /// Level prices in `RATIOS` order.
    pub levels: Vec<f64>,
}

/// Swing and levels over `window`, or `None` when the swing is too small.
pub fn find_retracement(window: &[PriceBar], min_swing_pct: f64) -> Option<Retracement> {
    let (hi_idx, hi) = window
        .iter()
        .enumerate()
        .map(|(i, b)| (i, b.high))
        .fold(None, |acc: Option<(usize, f64)>, (i, h)| match acc {
            Some((_, best)) if best >= h => acc,
            _ => Some((i, h)),
        })?;
    let (lo_idx, lo) = window
        .iter()
        .enumerate()
        .map(|(i, b)| (i, b.low))
        .fold(None, |acc: Option<(usize, f64)>, (i, l)| match acc {
            Some((_, best)) if best <= l => acc,
            _ => Some((i, l)),
        })?;

    let span = hi - lo;
    if lo <= 0.0 || span <= 0.0 || span / lo * 100.0 < min_swing_pct {
        return None;
    }

    let upswing = lo_idx < hi_idx;
    let levels = RATIOS
        .iter()
        .map(|r| if upswing { hi - r * span } else { lo + r * span })
        .collect();

    Some(Retracement {
        swing_high: hi,
        swing_low: lo,
        upswing,
        levels,
    })
}

/// `fibonacci:retracement` on the medium horizon.
pub fn retracement_signal(instrument_id: &str, bars: &[PriceBar], p: &IndicatorParams) -> Option<Signal> {
    if bars.len() < 2 {
        return None;
    }
    let window = &bars[bars.len().saturating_sub(p.fibonacci_lookback)..];
    let fib = find_retracement(window, p.fibonacci_min_swing_pct)?;

    let prev = bars[bars.len() - 2].close;
    let close = bars[bars.len() - 1].close;

    let direction = if close > prev {
        Direction::Bullish
    } else if close < prev {
        Direction::Bearish
    } else {
        return None;
    };

    let (lower, upper) = (prev.min(close), prev.max(close));
    let crossed = fib.levels.iter().any(|l| *l > lower && *l <= upper);
    if !crossed {
        return None;
    }

    // Nearest target still ahead of the close, falling back to the extreme.
    let target = match direction {
        Direction::Bullish => fib
            .levels
            .iter()
            .copied()
            .filter(|l| *l > close)
            .fold(fib.swing_high, f64::min),
        _ => fib
            .levels
            .iter()
            .copied()
            .filter(|l| *l < close)
            .fold(fib.swing_low, f64::max),
    };
    let distance = (target - close).abs() / (fib.swing_high - fib.swing_low);
    let strength = 1.0 / (1.0 + distance / HALF_STRENGTH_DISTANCE);

    emit(
        instrument_id,
        bars,
        "fibonacci:retracement",
        Horizon::Medium,
        direction,
        strength,
        RETRACEMENT_RELIABILITY,
    )
}
