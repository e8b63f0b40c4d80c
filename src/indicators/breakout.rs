// =============================================================================
// N-bar Breakout
// =============================================================================
//
// The last close is compared with the highest high / lowest low of the
// previous `lookback` bars (the last bar itself is excluded). A close beyond
// the range is a breakout in that direction; its strength is the breach
// measured in ATRs. A volume surge on the breakout bar raises reliability.
// =============================================================================

use crate::indicators::atr::calculate_atr;
use crate::indicators::emit;
use crate::market_data::PriceBar;
use crate::runtime_config::IndicatorParams;
use crate::signals::Signal;
use crate::types::{Direction, Horizon};

const BASE_RELIABILITY: f64 = 0.55;
const SURGE_RELIABILITY: f64 = 0.85;

/// Highest high and lowest low of `window`.
pub fn range_extremes(window: &[PriceBar]) -> Option<(f64, f64)> {
    let first = window.first()?;
    Some(window.iter().fold((first.high, first.low), |(hi, lo), b| {
        (hi.max(b.high), lo.min(b.low))
    }))
}

/// Whether the last bar's volume is at least `ratio` times the mean of `window`.
pub fn volume_surge(last: &PriceBar, window: &[PriceBar], ratio: f64) -> bool {
    if window.is_empty() {
        return false;
    }
    let mean = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
    mean > 0.0 && last.volume >= mean * ratio
}

/// `breakout:<N>bar` on the short horizon.
pub fn breakout_signal(instrument_id: &str, bars: &[PriceBar], p: &IndicatorParams) -> Option<Signal> {
    let lookback = p.breakout_lookback;
    if bars.len() < lookback + 1 {
        return None;
    }
    let (last, history) = bars.split_last()?;
    let window = &history[history.len() - lookback..];
    let (high, low) = range_extremes(window)?;

    let (direction, breach) = if last.close > high {
        (Direction::Bullish, last.close - high)
    } else if last.close < low {
        (Direction::Bearish, low - last.close)
    } else {
        return None;
    };

    let atr = calculate_atr(bars, p.atr_period)?;
    if atr <= 0.0 {
        return None;
    }

    let reliability = if volume_surge(last, window, p.volume_surge_ratio) {
        SURGE_RELIABILITY
    } else {
        BASE_RELIABILITY
    };

    emit(
        instrument_id,
        bars,
        format!("breakout:{lookback}bar"),
        Horizon::Short,
        direction,
        breach / atr,
        reliability,
    )
}
