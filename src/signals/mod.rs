// =============================================================================
// Signals Module
// =============================================================================
//
// Signal processing pipeline for the confluence engine:
// - Uniform Signal type, validation and staleness screening
// - Per-family normalization against the calibration table
// - Half-life decayed news sentiment
// - Direction-partitioned confidence fusion

pub mod fusion;
pub mod normalizer;
pub mod sentiment;
pub mod signal;

pub use fusion::{FusedScore, FusionEngine};
pub use normalizer::{CalibrationTable, FamilyCalibration, SignalNormalizer};
pub use signal::{screen, Signal};
