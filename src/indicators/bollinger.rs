// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA(period), upper / lower = middle ± k·σ.
//
// A close outside the bands is read as stretched (mean reversion): above the
// upper band is bearish, below the lower band is bullish. Strength is the
// distance beyond the band over the band half-width (k·σ).

use crate::indicators::{closes, emit};
use crate::market_data::PriceBar;
use crate::runtime_config::IndicatorParams;
use crate::signals::Signal;
use crate::types::{Direction, Horizon};

const BAND_RELIABILITY: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bands over the last `period` closes. `None` when data is short or the
/// middle band is zero.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    (upper.is_finite() && lower.is_finite()).then_some(BollingerResult { upper, middle, lower })
}

/// `volatility_band:bollinger` on the short horizon.
pub fn band_signal(instrument_id: &str, bars: &[PriceBar], p: &IndicatorParams) -> Option<Signal> {
    let closes = closes(bars);
    let bands = calculate_bollinger(&closes, p.bollinger_period, p.bollinger_k)?;
    let close = *closes.last()?;
    let half_width = bands.upper - bands.middle;
    if half_width <= 0.0 {
        return None;
    }

    let (direction, beyond) = if close > bands.upper {
        (Direction::Bearish, close - bands.upper)
    } else if close < bands.lower {
        (Direction::Bullish, bands.lower - close)
    } else {
        return None;
    };

    emit(
        instrument_id,
        bars,
        "volatility_band:bollinger",
        Horizon::Short,
        direction,
        beyond / half_width,
        BAND_RELIABILITY,
    )
}
