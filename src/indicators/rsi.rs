// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Price changes (deltas) from consecutive closes.
// Step 2 — Seed average gain / loss with the SMA of the first `period` deltas.
// Step 3 — Wilder's smoothing:
//            avg = (prev_avg * (period - 1) + current) / period
// Step 4 — RS = avg_gain / avg_loss,  RSI = 100 - 100 / (1 + RS)
//
// Signal mapping (short horizon, mean reversion):
//   RSI < 30  => bullish, strength = (30 - RSI) / 30
//   RSI > 70  => bearish, strength = (RSI - 70) / 30
//   otherwise => neutral, strength = 1 - |RSI - 50| / 20
// =============================================================================

use crate::indicators::{closes, emit};
use crate::market_data::PriceBar;
use crate::signals::Signal;
use crate::types::{Direction, Horizon};

pub const OVERSOLD: f64 = 30.0;
pub const OVERBOUGHT: f64 = 70.0;
const RSI_RELIABILITY: f64 = 0.65;

/// Full RSI series; one value per close starting at index `period`.
///
/// Empty for `period == 0` or fewer than `period + 1` closes. A non-finite
/// value truncates the series.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l - d)
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let Some(first) = rsi_from_averages(avg_gain, avg_loss) else {
        return Vec::new();
    };
    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push(first);

    for &delta in &deltas[period..] {
        avg_gain = (avg_gain * (period_f - 1.0) + delta.max(0.0)) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + (-delta).max(0.0)) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => result.push(rsi),
            None => break,
        }
    }

    result
}

/// Latest RSI value, if computable.
pub fn current_rsi(closes: &[f64], period: usize) -> Option<f64> {
    calculate_rsi(closes, period).last().copied()
}

/// `momentum:rsi` on the short horizon.
pub fn rsi_signal(instrument_id: &str, bars: &[PriceBar], period: usize) -> Option<Signal> {
    let rsi = current_rsi(&closes(bars), period)?;

    let (direction, strength) = if rsi < OVERSOLD {
        (Direction::Bullish, (OVERSOLD - rsi) / OVERSOLD)
    } else if rsi > OVERBOUGHT {
        (Direction::Bearish, (rsi - OVERBOUGHT) / (100.0 - OVERBOUGHT))
    } else {
        (Direction::Neutral, 1.0 - (rsi - 50.0).abs() / 20.0)
    };

    emit(
        instrument_id,
        bars,
        "momentum:rsi",
        Horizon::Short,
        direction,
        strength,
        RSI_RELIABILITY,
    )
}

/// RSI in [0, 100] from smoothed averages. No movement at all is 50.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    rsi.is_finite().then_some(rsi)
}
