use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One OHLCV sample for one instrument at one sampling interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Reason the bar cannot be stored, if any.
    pub fn defect(&self) -> Option<&'static str> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Some("non-finite or non-positive price");
        }
        if self.high < self.low {
            return Some("high below low");
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Some("invalid volume");
        }
        None
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Outcome of merging a batch of bars into a series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

// ---------------------------------------------------------------------------
// SeriesStore -- thread-safe ordered bar history per instrument
// ---------------------------------------------------------------------------

/// Ordered, de-duplicated bar history per instrument, trimmed to `max_bars`.
///
/// Stored bars are never modified. Readers receive copies, so an evaluation
/// always works on a consistent snapshot while ingestion continues.
pub struct SeriesStore {
    series: RwLock<HashMap<String, Vec<PriceBar>>>,
    max_bars: usize,
}

impl SeriesStore {
    pub fn new(max_bars: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_bars: max_bars.max(1),
        }
    }

    /// Merge `bars` into the series for `instrument_id`.
    ///
    /// * A bar whose timestamp is already stored is a duplicate and ignored.
    /// * Older bars are backfilled in timestamp order.
    /// * Malformed bars are rejected.
    pub fn ingest(&self, instrument_id: &str, bars: Vec<PriceBar>) -> IngestReport {
        let mut report = IngestReport::default();
        if bars.is_empty() {
            return report;
        }

        let mut map = self.series.write();
        let series = map.entry(instrument_id.to_string()).or_default();

        for bar in bars {
            if let Some(reason) = bar.defect() {
                warn!(symbol = %instrument_id, timestamp = %bar.timestamp, reason, "bar rejected");
                report.rejected += 1;
                continue;
            }

            // Fast path: strictly newer than everything stored.
            if series.last().map_or(true, |last| last.timestamp < bar.timestamp) {
                series.push(bar);
                report.accepted += 1;
                continue;
            }

            match series.binary_search_by_key(&bar.timestamp, |b| b.timestamp) {
                Ok(_) => report.duplicates += 1,
                Err(pos) => {
                    series.insert(pos, bar);
                    report.accepted += 1;
                }
            }
        }

        if series.len() > self.max_bars {
            let excess = series.len() - self.max_bars;
            series.drain(..excess);
        }

        debug!(
            symbol = %instrument_id,
            accepted = report.accepted,
            duplicates = report.duplicates,
            rejected = report.rejected,
            stored = series.len(),
            "bars ingested"
        );

        report
    }

    /// Return the most recent `count` bars (oldest-first order).
    pub fn bars(&self, instrument_id: &str, count: usize) -> Vec<PriceBar> {
        let map = self.series.read();
        match map.get(instrument_id) {
            Some(series) => {
                let start = series.len().saturating_sub(count);
                series[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Timestamp of the most recent stored bar, if any.
    pub fn last_timestamp(&self, instrument_id: &str) -> Option<DateTime<Utc>> {
        let map = self.series.read();
        map.get(instrument_id)
            .and_then(|series| series.last().map(|b| b.timestamp))
    }

    pub fn count(&self, instrument_id: &str) -> usize {
        let map = self.series.read();
        map.get(instrument_id).map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
