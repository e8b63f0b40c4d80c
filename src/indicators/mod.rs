// =============================================================================
// Indicator Library
// =============================================================================
//
// Pure, side-effect-free indicators over an instrument's bar series. Each
// indicator is one `IndicatorKind` variant; `evaluate` dispatches to the
// module that implements it. The same bars and parameters always produce the
// same signals, all stamped with the timestamp of the last bar.
//
// A series too short for an indicator yields `InsufficientData` for that
// indicator only; it is reported as skipped and never aborts the others.

pub mod atr;
pub mod bollinger;
pub mod breakout;
pub mod candlestick;
pub mod ema;
pub mod fibonacci;
pub mod roc;
pub mod rsi;
pub mod sma;

use tracing::debug;

use crate::error::EngineError;
use crate::market_data::PriceBar;
use crate::runtime_config::IndicatorParams;
use crate::signals::Signal;
use crate::types::{Direction, Horizon};

/// Every signal family the calibration table must cover.
pub const FAMILIES: &[&str] = &[
    "candlestick",
    "breakout",
    "volatility_band",
    "momentum",
    "trend",
    "fibonacci",
    "sentiment",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Candlestick,
    Breakout,
    VolatilityBand,
    Rsi,
    RocMedium,
    RocLong,
    EmaStack,
    MaCrossMedium,
    MaCrossLong,
    Fibonacci,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 10] = [
        IndicatorKind::Candlestick,
        IndicatorKind::Breakout,
        IndicatorKind::VolatilityBand,
        IndicatorKind::Rsi,
        IndicatorKind::RocMedium,
        IndicatorKind::RocLong,
        IndicatorKind::EmaStack,
        IndicatorKind::MaCrossMedium,
        IndicatorKind::MaCrossLong,
        IndicatorKind::Fibonacci,
    ];

    pub fn horizon(self) -> Horizon {
        match self {
            Self::Candlestick | Self::Breakout | Self::VolatilityBand | Self::Rsi => Horizon::Short,
            Self::RocMedium | Self::EmaStack | Self::MaCrossMedium | Self::Fibonacci => {
                Horizon::Medium
            }
            Self::RocLong | Self::MaCrossLong => Horizon::Long,
        }
    }

    /// Signal name (or name prefix, for candlestick patterns).
    pub fn label(self, p: &IndicatorParams) -> String {
        match self {
            Self::Candlestick => "candlestick".to_string(),
            Self::Breakout => format!("breakout:{}bar", p.breakout_lookback),
            Self::VolatilityBand => "volatility_band:bollinger".to_string(),
            Self::Rsi => "momentum:rsi".to_string(),
            Self::RocMedium => format!("momentum:roc_{}", p.roc_medium),
            Self::RocLong => format!("momentum:roc_{}", p.roc_long),
            Self::EmaStack => "trend:ema_stack".to_string(),
            Self::MaCrossMedium => format!("trend:ma_cross_{}_{}", p.ma_medium_fast, p.ma_medium_slow),
            Self::MaCrossLong => format!("trend:ma_cross_{}_{}", p.ma_long_fast, p.ma_long_slow),
            Self::Fibonacci => "fibonacci:retracement".to_string(),
        }
    }

    /// Minimum number of bars the indicator needs.
    pub fn required_bars(self, p: &IndicatorParams) -> usize {
        match self {
            Self::Candlestick => candlestick::MIN_BARS,
            Self::Breakout => p.breakout_lookback.max(p.atr_period) + 1,
            Self::VolatilityBand => p.bollinger_period,
            Self::Rsi => p.rsi_period + 1,
            Self::RocMedium => p.roc_medium + 1,
            Self::RocLong => p.roc_long + 1,
            Self::EmaStack => p.ema_slow,
            Self::MaCrossMedium => p.ma_medium_slow,
            Self::MaCrossLong => p.ma_long_slow,
            Self::Fibonacci => p.fibonacci_lookback,
        }
    }

    /// Run the indicator. An empty vec means "evaluated, nothing to report".
    pub fn evaluate(
        self,
        instrument_id: &str,
        bars: &[PriceBar],
        p: &IndicatorParams,
    ) -> Result<Vec<Signal>, EngineError> {
        let required = self.required_bars(p);
        if bars.len() < required {
            return Err(EngineError::insufficient(self.label(p), required, bars.len()));
        }

        let signals = match self {
            Self::Candlestick => candlestick::pattern_signals(instrument_id, bars),
            Self::Breakout => breakout::breakout_signal(instrument_id, bars, p).into_iter().collect(),
            Self::VolatilityBand => bollinger::band_signal(instrument_id, bars, p).into_iter().collect(),
            Self::Rsi => rsi::rsi_signal(instrument_id, bars, p.rsi_period).into_iter().collect(),
            Self::RocMedium => roc::roc_signal(instrument_id, bars, p.roc_medium, self.horizon())
                .into_iter()
                .collect(),
            Self::RocLong => roc::roc_signal(instrument_id, bars, p.roc_long, self.horizon())
                .into_iter()
                .collect(),
            Self::EmaStack => ema::ema_stack_signal(instrument_id, bars, p).into_iter().collect(),
            Self::MaCrossMedium => sma::ma_cross_signal(
                instrument_id,
                bars,
                p.ma_medium_fast,
                p.ma_medium_slow,
                p.cross_recency,
                self.horizon(),
            )
            .into_iter()
            .collect(),
            Self::MaCrossLong => sma::ma_cross_signal(
                instrument_id,
                bars,
                p.ma_long_fast,
                p.ma_long_slow,
                p.cross_recency,
                self.horizon(),
            )
            .into_iter()
            .collect(),
            Self::Fibonacci => fibonacci::retracement_signal(instrument_id, bars, p)
                .into_iter()
                .collect(),
        };
        Ok(signals)
    }
}

/// Signals produced for one instrument plus the indicators that were skipped.
#[derive(Debug, Default)]
pub struct IndicatorReport {
    pub signals: Vec<Signal>,
    pub skipped: Vec<EngineError>,
}

/// Run every indicator over `bars` (oldest first).
pub fn evaluate_all(instrument_id: &str, bars: &[PriceBar], p: &IndicatorParams) -> IndicatorReport {
    let mut report = IndicatorReport::default();
    for kind in IndicatorKind::ALL {
        match kind.evaluate(instrument_id, bars, p) {
            Ok(signals) => report.signals.extend(signals),
            Err(e) => {
                debug!(symbol = %instrument_id, indicator = ?kind, error = %e, "indicator skipped");
                report.skipped.push(e);
            }
        }
    }
    report
}

// =============================================================================
// Helpers shared by the indicator modules
// =============================================================================

pub(crate) fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Build a signal stamped with the last bar's timestamp.
pub(crate) fn emit(
    instrument_id: &str,
    bars: &[PriceBar],
    name: impl Into<String>,
    horizon: Horizon,
    direction: Direction,
    strength: f64,
    reliability: f64,
) -> Option<Signal> {
    let last = bars.last()?;
    Some(Signal::new(
        instrument_id,
        name,
        horizon,
        direction,
        strength,
        reliability,
        last.timestamp,
    ))
}
