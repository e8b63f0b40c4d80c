// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Only `Configuration` is fatal. The other variants are recorded per
// instrument / per indicator and never abort processing of anything else.

/// Domain errors raised by the evaluation core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Too few bars or news items for an indicator or aggregator.
    #[error("insufficient data for {what}: need {required}, have {available}")]
    InsufficientData {
        what: String,
        required: usize,
        available: usize,
    },

    /// Malformed signal (e.g. strength outside [0, 1]); excluded from fusion.
    #[error("invalid signal {name}: {reason}")]
    InvalidSignal { name: String, reason: String },

    /// Signal computed too long before the instrument's last known bar.
    #[error("stale signal {name}: {age_hours:.1}h behind last bar (tolerance {tolerance_hours:.1}h)")]
    StaleInput {
        name: String,
        age_hours: f64,
        tolerance_hours: f64,
    },

    /// Missing or invalid calibration table / threshold.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn insufficient(what: impl Into<String>, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            what: what.into(),
            required,
            available,
        }
    }

    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSignal {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
