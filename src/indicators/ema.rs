// =============================================================================
// Exponential Moving Average (EMA) and the EMA trend stack
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The first EMA value is seeded with the SMA of the first `period` closes.
//
// The stack (default 9 / 21 / 55) is trend-aligned when the three latest
// values are strictly ordered. Spread between fast and slow, relative to
// slow, measures how stretched the trend is; a 5 % spread reads as full
// strength.
// =============================================================================

use crate::indicators::{closes, emit};
use crate::market_data::PriceBar;
use crate::runtime_config::IndicatorParams;
use crate::signals::Signal;
use crate::types::{Direction, Horizon};

const FULL_SPREAD: f64 = 0.05;
const STACK_RELIABILITY: f64 = 0.75;

/// Compute the EMA series for `closes` and look-back `period`.
///
/// Output element `i` corresponds to close `period - 1 + i`. Empty when the
/// input is too short or `period` is zero. A non-finite value ends the series.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(seed);

    let mut prev = seed;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev = ema;
    }

    result
}

/// Direction and relative spread of a strictly ordered EMA stack.
///
/// `None` when data is short, the stack is mixed, or the slow EMA is zero.
pub fn ema_stack(closes: &[f64], fast: usize, mid: usize, slow: usize) -> Option<(Direction, f64)> {
    let f = *calculate_ema(closes, fast).last()?;
    let m = *calculate_ema(closes, mid).last()?;
    let s = *calculate_ema(closes, slow).last()?;

    let direction = if f > m && m > s {
        Direction::Bullish
    } else if f < m && m < s {
        Direction::Bearish
    } else {
        return None;
    };

    if s == 0.0 {
        return None;
    }
    let spread = (f - s).abs() / s.abs();
    spread.is_finite().then_some((direction, spread))
}

/// `trend:ema_stack` on the medium horizon.
pub fn ema_stack_signal(instrument_id: &str, bars: &[PriceBar], p: &IndicatorParams) -> Option<Signal> {
    let (direction, spread) = ema_stack(&closes(bars), p.ema_fast, p.ema_mid, p.ema_slow)?;
    emit(
        instrument_id,
        bars,
        "trend:ema_stack",
        Horizon::Medium,
        direction,
        spread / FULL_SPREAD,
        STACK_RELIABILITY,
    )
}
