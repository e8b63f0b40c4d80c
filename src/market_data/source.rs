// =============================================================================
// External data collaborators
// =============================================================================
//
// The engine never talks to a market-data provider or news service directly.
// It consumes these traits; `JsonFileSource` is the bundled implementation
// that reads files dropped by an upstream collector:
//
//   <root>/<instrument>/bars.json   array of PriceBar
//   <root>/<instrument>/news.json   array of NewsItem
//
// A missing file means "no data yet" and yields an empty result.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::news::NewsItem;
use super::series::PriceBar;

/// Supplies ordered price history. May return fewer bars than requested.
pub trait MarketDataSource: Send + Sync {
    fn fetch_bars(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>>;
}

/// Supplies news items with sentiment already scored.
pub trait NewsSource: Send + Sync {
    fn fetch_news(&self, instrument_id: &str, since: DateTime<Utc>) -> Result<Vec<NewsItem>>;
}

pub struct JsonFileSource {
    root: PathBuf,
}

impl JsonFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_array<T: DeserializeOwned>(&self, instrument_id: &str, file: &str) -> Result<Vec<T>> {
        let path = self.root.join(instrument_id).join(file);
        read_json_array(&path)
    }
}

fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        debug!(path = %path.display(), "no data file yet");
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

impl MarketDataSource for JsonFileSource {
    fn fetch_bars(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>> {
        let mut bars: Vec<PriceBar> = self.read_array(instrument_id, "bars.json")?;
        bars.retain(|b| b.timestamp >= from && b.timestamp <= to);
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

impl NewsSource for JsonFileSource {
    fn fetch_news(&self, instrument_id: &str, since: DateTime<Utc>) -> Result<Vec<NewsItem>> {
        let mut items: Vec<NewsItem> = self.read_array(instrument_id, "news.json")?;
        items.retain(|n| n.timestamp >= since);
        Ok(items)
    }
}
