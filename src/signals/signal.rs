// =============================================================================
// Signal — the uniform output of every indicator and the sentiment aggregator
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{clamp_unit, Direction, Horizon};

/// A directional reading with strength and reliability, both in [0, 1].
///
/// `name` has the form `<family>:<variant>`; the family selects the
/// calibration row used by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument_id: String,
    pub name: String,
    pub horizon: Horizon,
    pub direction: Direction,
    pub strength: f64,
    pub reliability: f64,
    pub computed_at: DateTime<Utc>,
    /// Set once the normalizer has rescaled this signal.
    #[serde(default)]
    pub normalized: bool,
}

impl Signal {
    /// Build a raw (not yet normalized) signal, clamping strength and
    /// reliability into [0, 1].
    pub fn new(
        instrument_id: impl Into<String>,
        name: impl Into<String>,
        horizon: Horizon,
        direction: Direction,
        strength: f64,
        reliability: f64,
        computed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            name: name.into(),
            horizon,
            direction,
            strength: clamp_unit(strength),
            reliability: clamp_unit(reliability),
            computed_at,
            normalized: false,
        }
    }

    /// Indicator family, i.e. the part of `name` before the first `:`.
    pub fn family(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }

    /// Contribution to its direction's aggregate weight.
    pub fn weight(&self) -> f64 {
        self.strength * self.reliability
    }

    /// Reject signals that break the [0, 1] invariants or carry no name.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::invalid("<unnamed>", "empty signal name"));
        }
        if self.instrument_id.trim().is_empty() {
            return Err(EngineError::invalid(&self.name, "empty instrument id"));
        }
        if !self.strength.is_finite() || !(0.0..=1.0).contains(&self.strength) {
            return Err(EngineError::invalid(
                &self.name,
                format!("strength {} outside [0, 1]", self.strength),
            ));
        }
        if !self.reliability.is_finite() || !(0.0..=1.0).contains(&self.reliability) {
            return Err(EngineError::invalid(
                &self.name,
                format!("reliability {} outside [0, 1]", self.reliability),
            ));
        }
        Ok(())
    }

    /// Reject signals computed more than `tolerance_hours` before the
    /// instrument's last known bar.
    pub fn check_fresh(
        &self,
        last_bar_at: Option<DateTime<Utc>>,
        tolerance_hours: f64,
    ) -> Result<(), EngineError> {
        let Some(last_bar_at) = last_bar_at else {
            return Ok(());
        };
        let lag_hours = (last_bar_at - self.computed_at).num_seconds() as f64 / 3600.0;
        if lag_hours > tolerance_hours {
            return Err(EngineError::StaleInput {
                name: self.name.clone(),
                age_hours: lag_hours,
                tolerance_hours,
            });
        }
        Ok(())
    }
}

/// Result of screening a candidate signal set before fusion.
#[derive(Debug, Default)]
pub struct Screened {
    pub usable: Vec<Signal>,
    pub rejected: Vec<EngineError>,
}

/// Split `signals` into those fit for fusion and the reasons the rest were
/// excluded. Order of `usable` follows the input order.
pub fn screen<'a>(
    signals: impl IntoIterator<Item = &'a Signal>,
    last_bar_at: Option<DateTime<Utc>>,
    tolerance_hours: f64,
) -> Screened {
    let mut out = Screened::default();
    for signal in signals {
        match signal
            .validate()
            .and_then(|_| signal.check_fresh(last_bar_at, tolerance_hours))
        {
            Ok(()) => out.usable.push(signal.clone()),
            Err(e) => out.rejected.push(e),
        }
    }
    out
}
