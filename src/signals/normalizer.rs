// =============================================================================
// Signal Normalizer — per-family rescaling onto a common [0, 1] scale
// =============================================================================
//
// Each indicator family reports strength on its own natural scale (a breakout
// measured in ATRs, a sentiment average, a pattern body ratio ...). The
// calibration table maps every family onto [0, 1] with either
//
//   min_max:  s' = (s - min) / (max - min)
//   z_score:  s' = 0.5 + ((s - mean) / std_dev) / 6     (±3σ spans [0, 1])
//
// and scales reliability by the family's `reliability_weight`. Output is
// flagged `normalized`, which makes a second pass a no-op. Horizon and
// direction are never touched.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::signals::signal::Signal;
use crate::types::clamp_unit;

/// Number of standard deviations mapped onto each half of the unit interval.
const Z_SPAN: f64 = 3.0;

fn default_one() -> f64 {
    1.0
}

fn default_half() -> f64 {
    0.5
}

fn default_sixth() -> f64 {
    1.0 / 6.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMethod {
    MinMax,
    ZScore,
}

/// One row of the calibration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyCalibration {
    pub method: ScaleMethod,

    /// Lower bound of the historical range (`min_max`).
    #[serde(default)]
    pub min: f64,

    /// Upper bound of the historical range (`min_max`).
    #[serde(default = "default_one")]
    pub max: f64,

    /// Historical mean (`z_score`).
    #[serde(default = "default_half")]
    pub mean: f64,

    /// Historical standard deviation (`z_score`).
    #[serde(default = "default_sixth")]
    pub std_dev: f64,

    /// Multiplier applied to reliability, in [0, 1].
    #[serde(default = "default_one")]
    pub reliability_weight: f64,
}

impl FamilyCalibration {
    pub fn min_max(min: f64, max: f64, reliability_weight: f64) -> Self {
        Self {
            method: ScaleMethod::MinMax,
            min,
            max,
            mean: default_half(),
            std_dev: default_sixth(),
            reliability_weight,
        }
    }

    pub fn z_score(mean: f64, std_dev: f64, reliability_weight: f64) -> Self {
        Self {
            method: ScaleMethod::ZScore,
            min: 0.0,
            max: 1.0,
            mean,
            std_dev,
            reliability_weight,
        }
    }

    /// Check that the row can actually rescale something.
    pub fn check(&self, family: &str) -> Result<(), EngineError> {
        let finite = [self.min, self.max, self.mean, self.std_dev, self.reliability_weight]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(EngineError::config(format!(
                "calibration for {family} contains non-finite values"
            )));
        }
        match self.method {
            ScaleMethod::MinMax if self.max <= self.min => {
                return Err(EngineError::config(format!(
                    "calibration for {family}: max ({}) must exceed min ({})",
                    self.max, self.min
                )));
            }
            ScaleMethod::ZScore if self.std_dev <= 0.0 => {
                return Err(EngineError::config(format!(
                    "calibration for {family}: std_dev must be positive"
                )));
            }
            _ => {}
        }
        if !(0.0..=1.0).contains(&self.reliability_weight) {
            return Err(EngineError::config(format!(
                "calibration for {family}: reliability_weight must be in [0, 1]"
            )));
        }
        Ok(())
    }

    fn rescale(&self, strength: f64) -> f64 {
        match self.method {
            ScaleMethod::MinMax => clamp_unit((strength - self.min) / (self.max - self.min)),
            ScaleMethod::ZScore => {
                let z = (strength - self.mean) / self.std_dev;
                clamp_unit(0.5 + z / (2.0 * Z_SPAN))
            }
        }
    }
}

/// Calibration rows keyed by indicator family.
pub type CalibrationTable = BTreeMap<String, FamilyCalibration>;

/// Rescales signals using a borrowed calibration table.
pub struct SignalNormalizer<'a> {
    table: &'a CalibrationTable,
}

impl<'a> SignalNormalizer<'a> {
    pub fn new(table: &'a CalibrationTable) -> Self {
        Self { table }
    }

    /// Normalize one signal. Already-normalized input is returned unchanged.
    pub fn normalize(&self, signal: Signal) -> Result<Signal, EngineError> {
        if signal.normalized {
            return Ok(signal);
        }
        signal.validate()?;

        let row = self.table.get(signal.family()).ok_or_else(|| {
            EngineError::invalid(
                &signal.name,
                format!("no calibration for family {}", signal.family()),
            )
        })?;

        Ok(Signal {
            strength: row.rescale(signal.strength),
            reliability: clamp_unit(signal.reliability * row.reliability_weight),
            normalized: true,
            ..signal
        })
    }

    /// Normalize a batch, splitting rejects out.
    pub fn normalize_all(&self, signals: Vec<Signal>) -> (Vec<Signal>, Vec<EngineError>) {
        let mut ok = Vec::with_capacity(signals.len());
        let mut rejected = Vec::new();
        for signal in signals {
            match self.normalize(signal) {
                Ok(s) => ok.push(s),
                Err(e) => rejected.push(e),
            }
        }
        (ok, rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::signal::tests::sig;
    use crate::types::{Direction, Horizon};

    fn table() -> CalibrationTable {
        let mut t = CalibrationTable::new();
        t.insert("breakout".into(), FamilyCalibration::min_max(0.0, 0.5, 0.8));
        t.insert("sentiment".into(), FamilyCalibration::z_score(0.2, 0.1, 1.0));
        t
    }

    #[test]
    fn min_max_rescales_and_weights_reliability() {
        let t = table();
        let n = SignalNormalizer::new(&t);
        let out = n
            .normalize(sig("breakout:20bar", Horizon::Short, Direction::Bullish, 0.25, 0.5))
            .unwrap();
        assert!((out.strength - 0.5).abs() < 1e-12);
        assert!((out.reliability - 0.4).abs() < 1e-12);
        assert!(out.normalized);
        assert_eq!(out.horizon, Horizon::Short);
        assert_eq!(out.direction, Direction::Bullish);
    }

    #[test]
    fn min_max_clamps_above_range() {
        let t = table();
        let n = SignalNormalizer::new(&t);
        let out = n
            .normalize(sig("breakout:20bar", Horizon::Short, Direction::Bearish, 0.9, 1.0))
            .unwrap();
        assert_eq!(out.strength, 1.0);
    }

    #[test]
    fn z_score_maps_mean_to_half() {
        let t = table();
        let n = SignalNormalizer::new(&t);
        let at_mean = n
            .normalize(sig("sentiment:news", Horizon::Short, Direction::Bullish, 0.2, 0.7))
            .unwrap();
        assert!((at_mean.strength - 0.5).abs() < 1e-12);
        let plus_3sd = n
            .normalize(sig("sentiment:news", Horizon::Short, Direction::Bullish, 0.5, 0.7))
            .unwrap();
        assert!((plus_3sd.strength - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let t = table();
        let n = SignalNormalizer::new(&t);
        let once = n
            .normalize(sig("breakout:20bar", Horizon::Short, Direction::Bullish, 0.3, 0.9))
            .unwrap();
        let twice = n.normalize(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_family_is_invalid() {
        let t = table();
        let n = SignalNormalizer::new(&t);
        let err = n
            .normalize(sig("mystery:x", Horizon::Long, Direction::Bullish, 0.3, 0.9))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSignal { .. }));
    }

    #[test]
    fn default_z_score_row_is_identity() {
        let row = FamilyCalibration {
            method: ScaleMethod::ZScore,
            min: 0.0,
            max: 1.0,
            mean: default_half(),
            std_dev: default_sixth(),
            reliability_weight: 1.0,
        };
        for s in [0.0, 0.25, 0.6, 1.0] {
            assert!((row.rescale(s) - s).abs() < 1e-12);
        }
    }

    #[test]
    fn degenerate_rows_fail_check() {
        assert!(FamilyCalibration::min_max(1.0, 1.0, 1.0).check("x").is_err());
        assert!(FamilyCalibration::z_score(0.0, 0.0, 1.0).check("x").is_err());
        assert!(FamilyCalibration::min_max(0.0, 1.0, 1.5).check("x").is_err());
        assert!(FamilyCalibration::min_max(0.0, 1.0, 1.0).check("x").is_ok());
    }

    #[test]
    fn row_deserialises_with_defaults() {
        let row: FamilyCalibration = serde_json::from_str(r#"{ "method": "min_max" }"#).unwrap();
        assert_eq!(row.min, 0.0);
        assert_eq!(row.max, 1.0);
        assert_eq!(row.reliability_weight, 1.0);
    }
}
