use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A sentiment-scored news item, as delivered by the news collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub instrument_id: String,
    pub timestamp: DateTime<Utc>,
    /// Sentiment in [-1, 1].
    pub raw_sentiment_score: f64,
    /// Trust in the source, in (0, 1].
    pub source_weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
}

impl NewsItem {
    pub fn is_well_formed(&self) -> bool {
        self.raw_sentiment_score.is_finite()
            && (-1.0..=1.0).contains(&self.raw_sentiment_score)
            && self.source_weight.is_finite()
            && self.source_weight > 0.0
            && self.source_weight <= 1.0
    }
}

/// Per-instrument news history. Items may arrive late or out of order; they
/// are kept sorted by timestamp. Exact duplicates and malformed items are
/// dropped at ingest.
pub struct NewsStore {
    items: RwLock<HashMap<String, Vec<NewsItem>>>,
}

impl NewsStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Merge `items`; returns how many were new.
    pub fn ingest(&self, instrument_id: &str, items: Vec<NewsItem>) -> usize {
        let mut map = self.items.write();
        let stored = map.entry(instrument_id.to_string()).or_default();
        let mut added = 0;

        for item in items {
            if item.instrument_id != instrument_id || stored.contains(&item) {
                continue;
            }
            if !item.is_well_formed() {
                warn!(
                    symbol = %instrument_id,
                    timestamp = %item.timestamp,
                    score = item.raw_sentiment_score,
                    weight = item.source_weight,
                    "malformed news item dropped"
                );
                continue;
            }
            let pos = stored.partition_point(|n| n.timestamp <= item.timestamp);
            stored.insert(pos, item);
            added += 1;
        }
        added
    }

    /// Copy of all items for the instrument, oldest first.
    pub fn items(&self, instrument_id: &str) -> Vec<NewsItem> {
        self.items
            .read()
            .get(instrument_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop items older than `cutoff`.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) {
        let mut map = self.items.write();
        for stored in map.values_mut() {
            stored.retain(|n| n.timestamp >= cutoff);
        }
    }
}

impl Default for NewsStore {
    fn default() -> Self {
        Self::new()
    }
}
