// =============================================================================
// Central Application State — Confluence Engine
// =============================================================================
//
// The single source of truth for the engine. The evaluator writes into it;
// the REST API and the digest only ever read from it.
//
// Per instrument, an `InstrumentBook` keeps the latest signal of every name
// per horizon, the fused score and the classification derived from it. A
// horizon whose signal set changed is marked dirty and recomputed wholesale;
// until that happens its classification is reported as stale and excluded
// from category queries.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - One parking_lot::Mutex per instrument book; the outer map lock is held
//     only to look up or insert an entry, so instruments never contend.
//   - Stores are copy-on-read behind parking_lot::RwLock.
//   - Configuration is an immutable snapshot swapped through `ConfigHandle`.
// =============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::warn;

use crate::classifier::{Classification, Classifier};
use crate::error::EngineError;
use crate::evaluator::CycleSummary;
use crate::market_data::{NewsStore, SeriesStore};
use crate::notify::NotificationPayload;
use crate::runtime_config::ConfigHandle;
use crate::signals::{screen, FusionEngine, Signal};
use crate::types::{Category, Horizon};

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// Issued notifications kept for the weekly report.
const MAX_NOTIFICATION_HISTORY: usize = 1000;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event (failed fetch, rejected config reload ...).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Instrument the error relates to, if any.
    pub instrument_id: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// Instrument book
// =============================================================================

/// Signals and derived state for one instrument on one horizon.
#[derive(Debug, Clone)]
pub struct HorizonBook {
    /// Latest signal per name.
    signals: BTreeMap<String, Signal>,
    latest_signal_at: Option<DateTime<Utc>>,
    dirty: bool,
    classification: Option<Classification>,
}

impl HorizonBook {
    fn new() -> Self {
        Self {
            signals: BTreeMap::new(),
            latest_signal_at: None,
            // Never evaluated: the first recompute must run even with no signals.
            dirty: true,
            classification: None,
        }
    }

    /// Whether the stored classification no longer reflects the signal set.
    pub fn is_stale(&self) -> bool {
        match &self.classification {
            None => true,
            Some(c) => self.dirty || self.latest_signal_at.is_some_and(|t| c.score.computed_at < t),
        }
    }
}

/// A horizon whose category changed on recompute.
#[derive(Debug, Clone)]
pub struct CategoryChange {
    pub previous: Option<Category>,
    pub classification: Classification,
}

impl CategoryChange {
    /// Entered an actionable category it was not already in.
    pub fn is_new_opportunity(&self) -> bool {
        self.classification.category.is_actionable()
            && self.previous != Some(self.classification.category)
    }
}

pub struct InstrumentBook {
    instrument_id: String,
    horizons: BTreeMap<Horizon, HorizonBook>,
    last_bar_at: Option<DateTime<Utc>>,
    evaluated_at: Option<DateTime<Utc>>,
    skipped: Vec<String>,
    rejected: Vec<String>,
}

impl InstrumentBook {
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            horizons: Horizon::ALL.iter().map(|h| (*h, HorizonBook::new())).collect(),
            last_bar_at: None,
            evaluated_at: None,
            skipped: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Merge freshly computed signals into the book.
    ///
    /// A signal replaces the stored one of the same name unless it is older;
    /// an identical signal changes nothing. A newer last bar marks every
    /// horizon dirty so staleness is re-screened. Returns how many signals
    /// were taken.
    pub fn apply_signals(&mut self, signals: Vec<Signal>, last_bar_at: Option<DateTime<Utc>>) -> usize {
        if last_bar_at > self.last_bar_at {
            self.last_bar_at = last_bar_at;
            for book in self.horizons.values_mut() {
                book.dirty = true;
            }
        }

        let mut taken = 0;
        for signal in signals {
            if signal.instrument_id != self.instrument_id {
                warn!(
                    symbol = %self.instrument_id,
                    signal = %signal.name,
                    other = %signal.instrument_id,
                    "signal for another instrument ignored"
                );
                continue;
            }
            let Some(book) = self.horizons.get_mut(&signal.horizon) else {
                continue;
            };
            match book.signals.get(&signal.name) {
                Some(old) if old.computed_at > signal.computed_at || *old == signal => continue,
                _ => {}
            }
            book.latest_signal_at = book.latest_signal_at.max(Some(signal.computed_at));
            book.signals.insert(signal.name.clone(), signal);
            book.dirty = true;
            taken += 1;
        }
        taken
    }

    /// Recompute every dirty horizon from its full current signal set.
    ///
    /// Signals that fail screening (invalid, or stale relative to the last
    /// bar) are dropped from the book and reported.
    pub fn recompute(
        &mut self,
        fusion: &FusionEngine,
        classifier: &Classifier,
        stale_tolerance_hours: f64,
    ) -> (Vec<CategoryChange>, Vec<EngineError>) {
        let mut changes = Vec::new();
        let mut rejected = Vec::new();
        let last_bar_at = self.last_bar_at;

        for (horizon, book) in self.horizons.iter_mut() {
            if !book.dirty {
                continue;
            }

            let screened = screen(book.signals.values(), last_bar_at, stale_tolerance_hours);
            let keep: HashSet<&str> = screened.usable.iter().map(|s| s.name.as_str()).collect();
            book.signals.retain(|name, _| keep.contains(name.as_str()));
            rejected.extend(screened.rejected);

            let reference = [last_bar_at, book.latest_signal_at]
                .into_iter()
                .flatten()
                .max()
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            let score = fusion.fuse(&self.instrument_id, *horizon, &screened.usable, reference);
            let classification = classifier.classify(score);

            let previous = book.classification.as_ref().map(|c| c.category);
            if previous != Some(classification.category) {
                changes.push(CategoryChange {
                    previous,
                    classification: classification.clone(),
                });
            }
            book.classification = Some(classification);
            book.dirty = false;
        }

        (changes, rejected)
    }

    /// Remember what the last evaluation skipped or rejected.
    pub fn record_diagnostics(&mut self, evaluated_at: DateTime<Utc>, skipped: &[EngineError], rejected: &[EngineError]) {
        self.evaluated_at = Some(evaluated_at);
        self.skipped = skipped.iter().map(ToString::to_string).collect();
        self.rejected = rejected.iter().map(ToString::to_string).collect();
    }

    /// Current, non-stale classifications.
    pub fn fresh_classifications(&self) -> impl Iterator<Item = &Classification> {
        self.horizons
            .values()
            .filter(|b| !b.is_stale())
            .filter_map(|b| b.classification.as_ref())
    }

    pub fn view(&self) -> InstrumentView {
        InstrumentView {
            instrument_id: self.instrument_id.clone(),
            last_bar_at: self.last_bar_at,
            bars_stored: 0,
            evaluated_at: self.evaluated_at,
            horizons: self
                .horizons
                .iter()
                .map(|(horizon, book)| HorizonView {
                    horizon: *horizon,
                    stale: book.is_stale(),
                    classification: book.classification.clone(),
                    signals: book.signals.values().cloned().collect(),
                })
                .collect(),
            skipped: self.skipped.clone(),
            rejected: self.rejected.clone(),
        }
    }

    pub fn summary(&self) -> InstrumentSummary {
        InstrumentSummary {
            instrument_id: self.instrument_id.clone(),
            last_bar_at: self.last_bar_at,
            horizons: self
                .horizons
                .iter()
                .map(|(horizon, book)| HorizonSummary {
                    horizon: *horizon,
                    category: book.classification.as_ref().map(|c| c.category),
                    confidence: book.classification.as_ref().map(Classification::confidence),
                    stale: book.is_stale(),
                })
                .collect(),
        }
    }
}

// =============================================================================
// Read-model views
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HorizonView {
    pub horizon: Horizon,
    pub stale: bool,
    pub classification: Option<Classification>,
    pub signals: Vec<Signal>,
}

/// Everything known about one instrument.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentView {
    pub instrument_id: String,
    pub last_bar_at: Option<DateTime<Utc>>,
    /// Bars held in the series store.
    pub bars_stored: usize,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub horizons: Vec<HorizonView>,
    /// Indicators skipped on the last evaluation (e.g. short series).
    pub skipped: Vec<String>,
    /// Signals rejected on the last evaluation.
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HorizonSummary {
    pub horizon: Horizon,
    pub category: Option<Category>,
    pub confidence: Option<f64>,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentSummary {
    pub instrument_id: String,
    pub last_bar_at: Option<DateTime<Utc>>,
    pub horizons: Vec<HorizonSummary>,
}

// =============================================================================
// AppState
// =============================================================================

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented after every evaluation cycle that changed something.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub config: ConfigHandle,

    // ── Market Data ─────────────────────────────────────────────────────
    pub series: Arc<SeriesStore>,
    pub news: Arc<NewsStore>,

    // ── Signal books ────────────────────────────────────────────────────
    books: RwLock<HashMap<String, Arc<Mutex<InstrumentBook>>>>,

    // ── Operational Status ──────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,
    /// Notifications delivered so far, oldest first.
    pub notification_history: RwLock<Vec<NotificationPayload>>,
    pub last_cycle: RwLock<Option<CycleSummary>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: ConfigHandle) -> Self {
        let max_bars = config.snapshot().config.max_bars;
        Self {
            state_version: AtomicU64::new(1),
            config,
            series: Arc::new(SeriesStore::new(max_bars)),
            news: Arc::new(NewsStore::new()),
            books: RwLock::new(HashMap::new()),
            recent_errors: RwLock::new(Vec::new()),
            notification_history: RwLock::new(Vec::new()),
            last_cycle: RwLock::new(None),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error. The ring buffer is capped at [`MAX_RECENT_ERRORS`];
    /// oldest entries are evicted first.
    pub fn push_error(&self, message: String, instrument_id: Option<&str>) {
        let record = ErrorRecord {
            message,
            instrument_id: instrument_id.map(str::to_string),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    // ── Notification History ────────────────────────────────────────────

    /// Remember a delivered notification. Capped at
    /// [`MAX_NOTIFICATION_HISTORY`]; oldest entries are evicted first.
    pub fn record_notification(&self, payload: NotificationPayload) {
        let mut history = self.notification_history.write();
        history.push(payload);
        if history.len() > MAX_NOTIFICATION_HISTORY {
            let excess = history.len() - MAX_NOTIFICATION_HISTORY;
            history.drain(..excess);
        }
    }

    /// Notifications issued at or after `since`, oldest first.
    pub fn notifications_since(&self, since: DateTime<Utc>) -> Vec<NotificationPayload> {
        self.notification_history
            .read()
            .iter()
            .filter(|p| p.issued_at >= since)
            .cloned()
            .collect()
    }

    // ── Books ───────────────────────────────────────────────────────────

    /// The book for `instrument_id`, created on first use.
    pub fn book(&self, instrument_id: &str) -> Arc<Mutex<InstrumentBook>> {
        if let Some(book) = self.books.read().get(instrument_id) {
            return book.clone();
        }
        self.books
            .write()
            .entry(instrument_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(InstrumentBook::new(instrument_id))))
            .clone()
    }

    fn all_books(&self) -> Vec<Arc<Mutex<InstrumentBook>>> {
        let map = self.books.read();
        let mut ids: Vec<&String> = map.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| map.get(id).cloned()).collect()
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn instruments(&self) -> Vec<InstrumentSummary> {
        self.all_books().iter().map(|b| b.lock().summary()).collect()
    }

    pub fn instrument_view(&self, instrument_id: &str) -> Option<InstrumentView> {
        let book = self.books.read().get(instrument_id).cloned()?;
        let mut view = book.lock().view();
        view.bars_stored = self.series.count(instrument_id);
        Some(view)
    }

    /// All current, non-stale classifications, highest confidence first.
    pub fn current_classifications(&self) -> Vec<Classification> {
        let mut out: Vec<Classification> = self
            .all_books()
            .iter()
            .flat_map(|b| b.lock().fresh_classifications().cloned().collect::<Vec<_>>())
            .collect();
        out.sort_by(|a, b| {
            b.confidence()
                .total_cmp(&a.confidence())
                .then_with(|| a.instrument_id.cmp(&b.instrument_id))
                .then_with(|| a.horizon().cmp(&b.horizon()))
        });
        out
    }

    pub fn classifications_by_category(&self, category: Category) -> Vec<Classification> {
        self.current_classifications()
            .into_iter()
            .filter(|c| c.category == category)
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::series::tests::{day, flat_bar};
    use crate::runtime_config::tests::test_config;
    use crate::signals::signal::tests::sig;
    use crate::types::Direction;

    fn tools() -> (FusionEngine, Classifier) {
        let cfg = test_config();
        (
            FusionEngine::new(cfg.thresholds.min_significance),
            Classifier::from_config(&cfg),
        )
    }

    fn golden_signals() -> Vec<Signal> {
        vec![
            sig("candlestick:hammer", Horizon::Short, Direction::Bullish, 0.8, 0.9),
            sig("breakout:20bar", Horizon::Short, Direction::Bullish, 0.6, 0.7),
            sig("momentum:rsi", Horizon::Short, Direction::Bullish, 0.3, 0.5),
            sig("sentiment:news", Horizon::Short, Direction::Bearish, 0.9, 0.4),
        ]
    }

    #[test]
    fn fresh_book_yields_none_for_every_horizon() {
        let (fusion, classifier) = tools();
        let mut book = InstrumentBook::new("2222.SR");
        let (changes, rejected) = book.recompute(&fusion, &classifier, 72.0);
        assert!(rejected.is_empty());
        assert_eq!(changes.len(), 3);
        for change in &changes {
            assert_eq!(change.classification.category, Category::None);
            assert_eq!(change.classification.rationale, vec!["insufficient data"]);
            assert!(!change.is_new_opportunity());
        }
    }

    #[test]
    fn golden_opportunity_is_reported_once() {
        let (fusion, classifier) = tools();
        let mut book = InstrumentBook::new("2222.SR");
        book.apply_signals(golden_signals(), Some(day(10)));
        let (changes, _) = book.recompute(&fusion, &classifier, 72.0);
        let short = changes
            .iter()
            .find(|c| c.classification.horizon() == Horizon::Short)
            .unwrap();
        assert_eq!(short.classification.category, Category::GoldenOpportunity);
        assert!(short.is_new_opportunity());

        // Same signals again: nothing dirty, nothing recomputed.
        assert_eq!(book.apply_signals(golden_signals(), Some(day(10))), 0);
        let (changes, _) = book.recompute(&fusion, &classifier, 72.0);
        assert!(changes.is_empty());
    }

    #[test]
    fn later_signal_makes_prior_classification_stale_on_next_read() {
        let (fusion, classifier) = tools();
        let state = AppState::new(ConfigHandle::new(test_config()).unwrap());
        let book = state.book("2222.SR");
        {
            let mut b = book.lock();
            b.apply_signals(golden_signals(), Some(day(10)));
            b.recompute(&fusion, &classifier, 72.0);
        }
        assert_eq!(state.classifications_by_category(Category::GoldenOpportunity).len(), 1);

        let mut later = sig("sentiment:news", Horizon::Short, Direction::Bearish, 0.9, 0.9);
        later.computed_at = day(11);
        book.lock().apply_signals(vec![later], Some(day(10)));

        let view = state.instrument_view("2222.SR").unwrap();
        let short = view.horizons.iter().find(|h| h.horizon == Horizon::Short).unwrap();
        assert!(short.stale);
        assert!(state.classifications_by_category(Category::GoldenOpportunity).is_empty());
    }

    #[test]
    fn older_signal_does_not_replace_newer() {
        let mut book = InstrumentBook::new("2222.SR");
        let mut newer = sig("momentum:rsi", Horizon::Short, Direction::Bullish, 0.6, 0.6);
        newer.computed_at = day(12);
        book.apply_signals(vec![newer.clone()], None);

        let older = sig("momentum:rsi", Horizon::Short, Direction::Bearish, 0.9, 0.9);
        assert_eq!(book.apply_signals(vec![older], None), 0);
        let stored = &book.horizons[&Horizon::Short].signals["momentum:rsi"];
        assert_eq!(stored, &newer);
    }

    #[test]
    fn stale_signals_are_dropped_on_recompute() {
        let (fusion, classifier) = tools();
        let mut book = InstrumentBook::new("2222.SR");
        book.apply_signals(golden_signals(), Some(day(10)));
        book.recompute(&fusion, &classifier, 72.0);

        // Ten days later nothing from day 10 is within tolerance.
        book.apply_signals(Vec::new(), Some(day(20)));
        assert!(book.horizons[&Horizon::Short].dirty);
        let (_, rejected) = book.recompute(&fusion, &classifier, 72.0);
        assert_eq!(rejected.len(), 4);
        assert!(rejected.iter().all(|e| matches!(e, EngineError::StaleInput { .. })));

        let short = &book.horizons[&Horizon::Short];
        assert!(short.signals.is_empty());
        assert_eq!(short.classification.as_ref().unwrap().category, Category::None);
    }

    #[test]
    fn foreign_signals_are_ignored() {
        let mut book = InstrumentBook::new("1120.SR");
        assert_eq!(book.apply_signals(golden_signals(), None), 0);
    }

    #[test]
    fn queries_sort_by_confidence_and_skip_unknown() {
        let (fusion, classifier) = tools();
        let state = AppState::new(ConfigHandle::new(test_config()).unwrap());
        {
            let book = state.book("2222.SR");
            let mut b = book.lock();
            b.apply_signals(golden_signals(), Some(day(10)));
            b.recompute(&fusion, &classifier, 72.0);
        }
        assert!(state.instrument_view("9999.SR").is_none());
        let all = state.current_classifications();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].score.confidence >= w[1].score.confidence));
        assert_eq!(state.instruments().len(), 1);
    }

    #[test]
    fn error_ring_is_capped() {
        let state = AppState::new(ConfigHandle::new(test_config()).unwrap());
        for i in 0..(MAX_RECENT_ERRORS + 5) {
            state.push_error(format!("error {i}"), Some("2222.SR"));
        }
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "error 5");
    }

    #[test]
    fn notification_history_is_capped_and_filtered_by_time() {
        let (fusion, classifier) = tools();
        let state = AppState::new(ConfigHandle::new(test_config()).unwrap());
        let score = fusion.fuse("2222.SR", Horizon::Short, &golden_signals(), day(10));
        let classification = classifier.classify(score);
        for i in 0..(MAX_NOTIFICATION_HISTORY + 3) {
            let day_index = if i < MAX_NOTIFICATION_HISTORY { 1 } else { 8 };
            state.record_notification(NotificationPayload::from_classification(
                &classification,
                day(day_index),
            ));
        }
        assert_eq!(state.notification_history.read().len(), MAX_NOTIFICATION_HISTORY);
        assert_eq!(state.notifications_since(day(7)).len(), 3);
        assert_eq!(state.notifications_since(day(0)).len(), MAX_NOTIFICATION_HISTORY);
    }

    #[test]
    fn instrument_view_reports_stored_bars() {
        let state = AppState::new(ConfigHandle::new(test_config()).unwrap());
        state.book("2222.SR");
        state.series.ingest(
            "2222.SR",
            (0..4).map(|n| flat_bar(n, 10.0)).collect(),
        );
        assert_eq!(state.instrument_view("2222.SR").unwrap().bars_stored, 4);
    }
}
