// =============================================================================
// Runtime Configuration — Versioned, hot-reloadable engine settings
// =============================================================================
//
// Every tunable of the confluence engine lives here: the instrument universe,
// classification thresholds, sentiment decay, indicator lookbacks and the
// per-family calibration table.
//
// Operational fields carry `#[serde(default = ...)]` so that adding new fields
// never breaks loading an older config file. The classification thresholds
// and the calibration table have no default: a file without them is a
// configuration error. A loaded config is frozen into an immutable, versioned
// `ConfigSnapshot`; the `ConfigHandle` swaps snapshots atomically so an
// evaluation always sees one consistent version from start to finish.
//
// =============================================================================

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::indicators::FAMILIES;
use crate::signals::CalibrationTable;

/// Upper bound for every hour-valued window (ten years).
const MAX_HORIZON_HOURS: f64 = 87_600.0;

/// Upper bound for the fetch lookbacks (ten years).
const MAX_LOOKBACK_DAYS: u32 = 3_650;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "2222.SR".to_string(),
        "1120.SR".to_string(),
        "2010.SR".to_string(),
        "7010.SR".to_string(),
        "1180.SR".to_string(),
    ]
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_history_days() -> u32 {
    400
}

fn default_news_lookback_days() -> u32 {
    7
}

fn default_max_bars() -> usize {
    500
}

fn default_evaluation_interval_secs() -> u64 {
    300
}

fn default_config_poll_secs() -> u64 {
    5
}

fn default_digest_interval_hours() -> u64 {
    24
}

fn default_stale_tolerance_hours() -> f64 {
    72.0
}

fn default_rationale_top_n() -> usize {
    3
}

fn default_half_life_hours() -> f64 {
    24.0
}

fn default_window_hours() -> f64 {
    168.0
}

fn default_neutral_epsilon() -> f64 {
    0.05
}

fn default_saturation_mass() -> f64 {
    3.0
}

// =============================================================================
// Thresholds
// =============================================================================

/// Classification cut-offs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Short-horizon confidence at or above which a golden opportunity fires.
    pub golden_threshold: f64,

    /// Medium/long-horizon confidence for a buy or sell recommendation.
    pub buy_sell_threshold: f64,

    /// Below this a score is flagged low-confidence and never `hold`.
    pub min_significance: f64,
}

// =============================================================================
// SentimentParams
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentParams {
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,

    /// Items older than this never contribute.
    #[serde(default = "default_window_hours")]
    pub window_hours: f64,

    /// |aggregate| below this reads as neutral.
    #[serde(default = "default_neutral_epsilon")]
    pub neutral_epsilon: f64,

    /// Decayed weight mass at which reliability reaches 1 - 1/e.
    #[serde(default = "default_saturation_mass")]
    pub saturation_mass: f64,
}

impl Default for SentimentParams {
    fn default() -> Self {
        Self {
            half_life_hours: default_half_life_hours(),
            window_hours: default_window_hours(),
            neutral_epsilon: default_neutral_epsilon(),
            saturation_mass: default_saturation_mass(),
        }
    }
}

// =============================================================================
// IndicatorParams
// =============================================================================

/// Lookbacks for the indicator library. Missing fields fall back to the
/// `Default` impl as a whole-struct default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub breakout_lookback: usize,
    pub atr_period: usize,
    /// Last-bar volume over mean volume that counts as a surge.
    pub volume_surge_ratio: f64,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
    pub rsi_period: usize,
    pub roc_medium: usize,
    pub roc_long: usize,
    pub ema_fast: usize,
    pub ema_mid: usize,
    pub ema_slow: usize,
    pub ma_medium_fast: usize,
    pub ma_medium_slow: usize,
    pub ma_long_fast: usize,
    pub ma_long_slow: usize,
    /// A moving-average cross within this many bars counts as fresh.
    pub cross_recency: usize,
    pub fibonacci_lookback: usize,
    /// Minimum high-low swing, in percent of the low, to draw levels from.
    pub fibonacci_min_swing_pct: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            breakout_lookback: 20,
            atr_period: 14,
            volume_surge_ratio: 1.5,
            bollinger_period: 20,
            bollinger_k: 2.0,
            rsi_period: 14,
            roc_medium: 20,
            roc_long: 120,
            ema_fast: 9,
            ema_mid: 21,
            ema_slow: 55,
            ma_medium_fast: 20,
            ma_medium_slow: 50,
            ma_long_fast: 50,
            ma_long_slow: 200,
            cross_recency: 5,
            fibonacci_lookback: 60,
            fibonacci_min_swing_pct: 5.0,
        }
    }
}

impl IndicatorParams {
    fn validate(&self) -> std::result::Result<(), EngineError> {
        let lookbacks = [
            ("breakout_lookback", self.breakout_lookback),
            ("atr_period", self.atr_period),
            ("bollinger_period", self.bollinger_period),
            ("rsi_period", self.rsi_period),
            ("roc_medium", self.roc_medium),
            ("roc_long", self.roc_long),
            ("ema_fast", self.ema_fast),
            ("ma_medium_fast", self.ma_medium_fast),
            ("ma_long_fast", self.ma_long_fast),
            ("cross_recency", self.cross_recency),
            ("fibonacci_lookback", self.fibonacci_lookback),
        ];
        if let Some((name, _)) = lookbacks.iter().find(|(_, v)| *v == 0) {
            return Err(EngineError::config(format!("indicators.{name} must be positive")));
        }

        let ordered = [
            ("ema_fast < ema_mid < ema_slow", self.ema_fast < self.ema_mid && self.ema_mid < self.ema_slow),
            ("ma_medium_fast < ma_medium_slow", self.ma_medium_fast < self.ma_medium_slow),
            ("ma_long_fast < ma_long_slow", self.ma_long_fast < self.ma_long_slow),
        ];
        if let Some((rule, _)) = ordered.iter().find(|(_, ok)| !ok) {
            return Err(EngineError::config(format!("indicators: expected {rule}")));
        }

        if !(self.bollinger_k > 0.0) || !(self.volume_surge_ratio > 0.0) {
            return Err(EngineError::config(
                "indicators: bollinger_k and volume_surge_ratio must be positive",
            ));
        }
        if !(self.fibonacci_min_swing_pct >= 0.0) {
            return Err(EngineError::config(
                "indicators.fibonacci_min_swing_pct must be non-negative",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the confluence engine.
///
/// `thresholds` and `calibration` are required; everything else falls back to
/// a serde default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Universe & data ----------------------------------------------------

    /// Instruments evaluated every cycle.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Root directory of the JSON file data collaborator.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// How far back the first fetch of bars reaches.
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// How far back the first fetch of news reaches.
    #[serde(default = "default_news_lookback_days")]
    pub news_lookback_days: u32,

    /// Bars retained per instrument.
    #[serde(default = "default_max_bars")]
    pub max_bars: usize,

    // --- Scheduling ---------------------------------------------------------

    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,

    /// How often the config file is checked for changes.
    #[serde(default = "default_config_poll_secs")]
    pub config_poll_secs: u64,

    #[serde(default = "default_digest_interval_hours")]
    pub digest_interval_hours: u64,

    // --- Evaluation ---------------------------------------------------------

    /// Signals computed longer than this before the last bar are dropped.
    #[serde(default = "default_stale_tolerance_hours")]
    pub stale_tolerance_hours: f64,

    /// Contributors listed in a classification rationale.
    #[serde(default = "default_rationale_top_n")]
    pub rationale_top_n: usize,

    pub thresholds: Thresholds,

    #[serde(default)]
    pub sentiment: SentimentParams,

    #[serde(default)]
    pub indicators: IndicatorParams,

    /// Per-family normalization rows, keyed by indicator family.
    pub calibration: CalibrationTable,
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing or unparsable file is an error; the caller decides whether
    /// that is fatal (startup) or keeps the previous snapshot (reload).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config = Self::from_json(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            families = config.calibration.len(),
            "engine config loaded"
        );

        Ok(config)
    }

    /// Parse a configuration document. A malformed document, or one missing
    /// the thresholds or the calibration table, is a configuration error.
    pub fn from_json(content: &str) -> std::result::Result<Self, EngineError> {
        serde_json::from_str(content)
            .map_err(|e| EngineError::config(format!("malformed engine config: {e}")))
    }

    /// Reject configurations the engine cannot evaluate with.
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        if self.symbols.iter().all(|s| s.trim().is_empty()) {
            return Err(EngineError::config("symbols must not be empty"));
        }

        let t = &self.thresholds;
        for (name, v) in [
            ("golden_threshold", t.golden_threshold),
            ("buy_sell_threshold", t.buy_sell_threshold),
            ("min_significance", t.min_significance),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(EngineError::config(format!("{name} must be in [0, 1], got {v}")));
            }
        }
        if !(t.min_significance <= t.buy_sell_threshold && t.buy_sell_threshold < t.golden_threshold)
        {
            return Err(EngineError::config(
                "thresholds must satisfy min_significance <= buy_sell_threshold < golden_threshold",
            ));
        }

        let s = &self.sentiment;
        if !(s.half_life_hours > 0.0) || !(s.window_hours > 0.0) || !(s.saturation_mass > 0.0) {
            return Err(EngineError::config(
                "sentiment half_life_hours, window_hours and saturation_mass must be positive",
            ));
        }
        if s.half_life_hours > MAX_HORIZON_HOURS || s.window_hours > MAX_HORIZON_HOURS {
            return Err(EngineError::config(format!(
                "sentiment half_life_hours and window_hours must not exceed {MAX_HORIZON_HOURS}"
            )));
        }
        if !(0.0..1.0).contains(&s.neutral_epsilon) {
            return Err(EngineError::config("sentiment.neutral_epsilon must be in [0, 1)"));
        }

        self.indicators.validate()?;

        for family in FAMILIES {
            let row = self.calibration.get(*family).ok_or_else(|| {
                EngineError::config(format!("calibration row missing for family {family}"))
            })?;
            row.check(family)?;
        }
        for (family, row) in &self.calibration {
            row.check(family)?;
        }

        if self.max_bars == 0
            || self.evaluation_interval_secs == 0
            || self.config_poll_secs == 0
            || self.digest_interval_hours == 0
        {
            return Err(EngineError::config(
                "max_bars and every interval (evaluation, config poll, digest) must be positive",
            ));
        }
        if self.history_days > MAX_LOOKBACK_DAYS || self.news_lookback_days > MAX_LOOKBACK_DAYS {
            return Err(EngineError::config(format!(
                "history_days and news_lookback_days must not exceed {MAX_LOOKBACK_DAYS}"
            )));
        }
        if !(self.stale_tolerance_hours > 0.0) || self.stale_tolerance_hours > MAX_HORIZON_HOURS {
            return Err(EngineError::config(format!(
                "stale_tolerance_hours must be in (0, {MAX_HORIZON_HOURS}]"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Versioned snapshots
// =============================================================================

/// An immutable, validated configuration as seen by one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub config: EngineConfig,
}

/// Shared pointer to the current snapshot. Readers clone the `Arc` and keep
/// it for the duration of their work; writers swap in a new one.
pub struct ConfigHandle {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigHandle {
    /// Wrap an initial configuration as version 1. Fails if it is invalid.
    pub fn new(config: EngineConfig) -> std::result::Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(ConfigSnapshot {
                version: 1,
                loaded_at: Utc::now(),
                config,
            })),
        })
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.read().clone()
    }

    /// Validate and install `config`, returning the new version. An invalid
    /// config leaves the current snapshot untouched.
    pub fn swap(&self, config: EngineConfig) -> std::result::Result<u64, EngineError> {
        config.validate()?;
        let mut current = self.current.write();
        if current.config == config {
            return Ok(current.version);
        }
        let version = current.version + 1;
        *current = Arc::new(ConfigSnapshot {
            version,
            loaded_at: Utc::now(),
            config,
        });
        info!(version, "config snapshot swapped");
        Ok(version)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    use crate::signals::FamilyCalibration;

    /// The configuration shipped with the engine.
    pub(crate) fn test_config() -> EngineConfig {
        EngineConfig::from_json(include_str!("../engine_config.json")).unwrap()
    }

    #[test]
    fn shipped_config_has_expected_values() {
        let cfg = test_config();
        assert_eq!(cfg.symbols.len(), 5);
        assert_eq!(cfg.symbols[0], "2222.SR");
        assert!((cfg.thresholds.golden_threshold - 0.75).abs() < f64::EPSILON);
        assert!((cfg.thresholds.buy_sell_threshold - 0.60).abs() < f64::EPSILON);
        assert!((cfg.thresholds.min_significance - 0.35).abs() < f64::EPSILON);
        assert!((cfg.sentiment.neutral_epsilon - 0.05).abs() < f64::EPSILON);
        assert_eq!(cfg.indicators.ma_long_slow, 200);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn shipped_calibration_covers_every_family() {
        let cfg = test_config();
        for family in FAMILIES {
            assert!(cfg.calibration.contains_key(*family), "missing {family}");
        }
    }

    #[test]
    fn empty_document_is_a_configuration_error() {
        assert!(matches!(
            EngineConfig::from_json("{}"),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn missing_calibration_table_is_rejected() {
        let json = r#"{
            "symbols": ["2222.SR"],
            "thresholds": { "golden_threshold": 0.75, "buy_sell_threshold": 0.6, "min_significance": 0.35 }
        }"#;
        let err = EngineConfig::from_json(json).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(err.to_string().contains("calibration"), "{err}");
    }

    #[test]
    fn missing_threshold_is_rejected() {
        let mut doc: serde_json::Value = serde_json::from_str(include_str!("../engine_config.json")).unwrap();
        doc["thresholds"].as_object_mut().unwrap().remove("buy_sell_threshold");
        let err = EngineConfig::from_json(&doc.to_string()).unwrap_err();
        assert!(err.to_string().contains("buy_sell_threshold"), "{err}");

        let mut doc: serde_json::Value = serde_json::from_str(include_str!("../engine_config.json")).unwrap();
        doc.as_object_mut().unwrap().remove("thresholds");
        assert!(EngineConfig::from_json(&doc.to_string()).is_err());
    }

    #[test]
    fn operational_fields_fill_defaults() {
        let json = r#"{
            "symbols": ["1120.SR"],
            "thresholds": { "golden_threshold": 0.8, "buy_sell_threshold": 0.6, "min_significance": 0.35 },
            "indicators": { "rsi_period": 10 },
            "calibration": {}
        }"#;
        let cfg = EngineConfig::from_json(json).unwrap();
        assert_eq!(cfg.symbols, vec!["1120.SR"]);
        assert!((cfg.thresholds.golden_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(cfg.indicators.rsi_period, 10);
        assert_eq!(cfg.indicators.bollinger_period, 20);
        assert_eq!(cfg.max_bars, 500);
        // Parses, but an empty table cannot evaluate anything.
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_misordered_thresholds() {
        let mut cfg = test_config();
        cfg.thresholds.buy_sell_threshold = 0.9;
        assert!(matches!(cfg.validate(), Err(EngineError::Configuration(_))));

        let mut cfg = test_config();
        cfg.thresholds.golden_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_calibration_row() {
        let mut cfg = test_config();
        cfg.calibration.remove("fibonacci");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("fibonacci"));
    }

    #[test]
    fn validate_rejects_degenerate_row_and_lookbacks() {
        let mut cfg = test_config();
        cfg.calibration
            .insert("trend".into(), FamilyCalibration::min_max(1.0, 1.0, 1.0));
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.indicators.ma_long_fast = 250;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.indicators.rsi_period = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.sentiment.half_life_hours = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.digest_interval_hours = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_bounds_time_windows() {
        let mut cfg = test_config();
        cfg.sentiment.window_hours = 1e300;
        assert!(matches!(cfg.validate(), Err(EngineError::Configuration(_))));

        let mut cfg = test_config();
        cfg.sentiment.half_life_hours = f64::INFINITY;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.history_days = u32::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.stale_tolerance_hours = 1e12;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.sentiment.window_hours = MAX_HORIZON_HOURS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_reads_a_file_and_reports_the_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(include_str!("../engine_config.json").as_bytes())
            .unwrap();
        assert_eq!(EngineConfig::load(file.path()).unwrap(), test_config());

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        broken.write_all(br#"{"symbols": ["2222.SR"]}"#).unwrap();
        let err = EngineConfig::load(broken.path()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains(&broken.path().display().to_string()));
        assert!(err.downcast_ref::<EngineError>().is_some());
    }

    #[test]
    fn handle_swaps_versions_and_keeps_old_on_invalid() {
        let handle = ConfigHandle::new(test_config()).unwrap();
        let before = handle.snapshot();
        assert_eq!(before.version, 1);

        let mut next = test_config();
        next.rationale_top_n = 5;
        assert_eq!(handle.swap(next).unwrap(), 2);

        let mut bad = test_config();
        bad.symbols.clear();
        assert!(handle.swap(bad).is_err());

        let after = handle.snapshot();
        assert_eq!(after.version, 2);
        assert_eq!(after.config.rationale_top_n, 5);
        // The reader that grabbed version 1 still sees it.
        assert_eq!(before.config.rationale_top_n, 3);
    }

    #[test]
    fn identical_swap_keeps_version() {
        let handle = ConfigHandle::new(test_config()).unwrap();
        assert_eq!(handle.swap(test_config()).unwrap(), 1);
    }
}
