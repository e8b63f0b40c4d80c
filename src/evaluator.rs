// =============================================================================
// Evaluator — the per-instrument pipeline and the evaluation cycle
// =============================================================================
//
// Per instrument, strictly in this order:
//
//   1. Fetch new bars / news from the collaborators and merge them into the
//      stores (bars and news are fetched independently; a failed fetch is
//      recorded and evaluation goes on with what is already stored)
//   2. Run the indicator library over the bar series
//   3. Aggregate news sentiment
//   4. Normalize every signal against the calibration table
//   5. Merge into the instrument's book; recompute dirty horizons
//   6. Notify on newly actionable classifications
//
// Instruments are independent and run in parallel on the blocking pool. Every
// instrument in a cycle sees the same configuration snapshot.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app_state::{AppState, CategoryChange};
use crate::classifier::Classifier;
use crate::indicators;
use crate::market_data::{IngestReport, MarketDataSource, NewsSource};
use crate::notify::{NotificationPayload, Notifier};
use crate::runtime_config::{ConfigSnapshot, EngineConfig};
use crate::signals::{sentiment, FusionEngine, SignalNormalizer};

/// Days re-requested behind the newest stored bar, so late corrections and
/// backfilled bars are picked up.
const BACKFILL_DAYS: i64 = 10;

/// The outside world as seen by the evaluator.
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketDataSource>,
    pub news: Arc<dyn NewsSource>,
    pub notifier: Arc<dyn Notifier>,
}

/// What one instrument's evaluation did.
#[derive(Debug, Default)]
pub struct InstrumentOutcome {
    pub instrument_id: String,
    pub bars: IngestReport,
    pub news_added: usize,
    pub fetch_failed: bool,
    pub signals: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub changes: Vec<CategoryChange>,
}

/// What `fetch_and_ingest` pulled in, plus every fetch that failed.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub bars: IngestReport,
    pub news_added: usize,
    pub errors: Vec<anyhow::Error>,
}

/// Totals for one evaluation cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_version: u64,
    pub instruments: usize,
    pub fetch_failures: usize,
    pub signals: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub changes: usize,
    pub notifications: usize,
}

// =============================================================================
// Single instrument
// =============================================================================

/// Pull whatever the collaborators have for `instrument_id` into the stores.
/// A failed bar fetch does not stop the news fetch.
pub fn fetch_and_ingest(
    state: &AppState,
    collaborators: &Collaborators,
    config: &EngineConfig,
    instrument_id: &str,
    now: DateTime<Utc>,
) -> FetchReport {
    let mut report = FetchReport::default();

    let from = match state.series.last_timestamp(instrument_id) {
        Some(last) => last - Duration::days(BACKFILL_DAYS),
        None => now - Duration::days(i64::from(config.history_days)),
    };
    match collaborators
        .market
        .fetch_bars(instrument_id, from, now)
        .with_context(|| format!("failed to fetch bars for {instrument_id}"))
    {
        Ok(bars) => report.bars = state.series.ingest(instrument_id, bars),
        Err(e) => report.errors.push(e),
    }

    let since = now - Duration::days(i64::from(config.news_lookback_days));
    match collaborators
        .news
        .fetch_news(instrument_id, since)
        .with_context(|| format!("failed to fetch news for {instrument_id}"))
    {
        Ok(items) => report.news_added = state.news.ingest(instrument_id, items),
        Err(e) => report.errors.push(e),
    }

    report
}

/// Run the signal pipeline for one instrument against the stored data.
///
/// `as_of` is the evaluation time used for sentiment decay. Indicator
/// signals are stamped with their last bar, so the same stored data always
/// produces the same book.
pub fn evaluate_instrument(
    state: &AppState,
    snapshot: &ConfigSnapshot,
    instrument_id: &str,
    as_of: DateTime<Utc>,
) -> InstrumentOutcome {
    let cfg = &snapshot.config;

    // ── 1. Indicators ────────────────────────────────────────────────────
    let bars = state.series.bars(instrument_id, cfg.max_bars);
    let last_bar_at = bars.last().map(|b| b.timestamp);
    let report = indicators::evaluate_all(instrument_id, &bars, &cfg.indicators);
    let mut raw = report.signals;
    let mut skipped = report.skipped;

    // ── 2. Sentiment ─────────────────────────────────────────────────────
    let items = state.news.items(instrument_id);
    match sentiment::aggregate(instrument_id, &items, as_of, &cfg.sentiment) {
        Ok(signal) => raw.push(signal),
        Err(e) => {
            debug!(symbol = %instrument_id, error = %e, "no sentiment signal");
            skipped.push(e);
        }
    }

    // ── 3. Normalize ─────────────────────────────────────────────────────
    let normalizer = SignalNormalizer::new(&cfg.calibration);
    let (normalized, mut rejected) = normalizer.normalize_all(raw);
    let signals = normalized.len();

    // ── 4. Fuse + classify dirty horizons ───────────────────────────────
    let fusion = FusionEngine::new(cfg.thresholds.min_significance);
    let classifier = Classifier::from_config(cfg);

    let book = state.book(instrument_id);
    let mut book = book.lock();
    book.apply_signals(normalized, last_bar_at);
    let (changes, screened_out) = book.recompute(&fusion, &classifier, cfg.stale_tolerance_hours);
    rejected.extend(screened_out);
    book.record_diagnostics(as_of, &skipped, &rejected);
    drop(book);

    for e in &rejected {
        warn!(symbol = %instrument_id, error = %e, "signal rejected");
    }

    InstrumentOutcome {
        instrument_id: instrument_id.to_string(),
        signals,
        skipped: skipped.len(),
        rejected: rejected.len(),
        changes,
        ..InstrumentOutcome::default()
    }
}

fn fetch_and_evaluate(
    state: &AppState,
    collaborators: &Collaborators,
    snapshot: &ConfigSnapshot,
    instrument_id: &str,
    now: DateTime<Utc>,
) -> InstrumentOutcome {
    let fetched = fetch_and_ingest(state, collaborators, &snapshot.config, instrument_id, now);
    for e in &fetched.errors {
        warn!(symbol = %instrument_id, error = %format!("{e:#}"), "fetch failed, using stored data");
        state.push_error(format!("{e:#}"), Some(instrument_id));
    }

    let mut outcome = evaluate_instrument(state, snapshot, instrument_id, now);
    outcome.bars = fetched.bars;
    outcome.news_added = fetched.news_added;
    outcome.fetch_failed = !fetched.errors.is_empty();
    outcome
}

// =============================================================================
// Cycle
// =============================================================================

/// Evaluate every configured instrument once, in parallel.
pub async fn run_cycle(state: Arc<AppState>, collaborators: Collaborators) -> CycleSummary {
    let snapshot = state.config.snapshot();
    let started_at = Utc::now();

    let cutoff_hours = (i64::from(snapshot.config.news_lookback_days) * 24)
        .max(snapshot.config.sentiment.window_hours.ceil() as i64);
    state.news.prune_before(started_at - Duration::hours(cutoff_hours));

    let mut set = JoinSet::new();
    for instrument_id in snapshot.config.symbols.iter().filter(|s| !s.trim().is_empty()) {
        let state = state.clone();
        let collaborators = collaborators.clone();
        let snapshot = snapshot.clone();
        let instrument_id = instrument_id.clone();
        set.spawn_blocking(move || {
            fetch_and_evaluate(&state, &collaborators, &snapshot, &instrument_id, started_at)
        });
    }

    let mut summary = CycleSummary {
        started_at: Some(started_at),
        config_version: snapshot.version,
        ..CycleSummary::default()
    };

    while let Some(joined) = set.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "instrument evaluation task failed");
                state.push_error(format!("evaluation task failed: {e}"), None);
                continue;
            }
        };

        debug!(
            symbol = %outcome.instrument_id,
            bars_accepted = outcome.bars.accepted,
            news_added = outcome.news_added,
            signals = outcome.signals,
            changes = outcome.changes.len(),
            "instrument evaluated"
        );
        summary.instruments += 1;
        summary.fetch_failures += usize::from(outcome.fetch_failed);
        summary.signals += outcome.signals;
        summary.skipped += outcome.skipped;
        summary.rejected += outcome.rejected;
        summary.changes += outcome.changes.len();

        for change in outcome.changes.iter().filter(|c| c.is_new_opportunity()) {
            let payload = NotificationPayload::from_classification(&change.classification, Utc::now());
            match collaborators.notifier.notify(&payload) {
                Ok(()) => {
                    summary.notifications += 1;
                    state.record_notification(payload);
                }
                Err(e) => {
                    warn!(symbol = %payload.instrument_id, error = %e, "notification failed");
                    state.push_error(format!("notification failed: {e:#}"), Some(&payload.instrument_id));
                }
            }
        }
    }

    summary.finished_at = Some(Utc::now());
    info!(
        config_version = summary.config_version,
        instruments = summary.instruments,
        signals = summary.signals,
        skipped = summary.skipped,
        rejected = summary.rejected,
        changes = summary.changes,
        notifications = summary.notifications,
        fetch_failures = summary.fetch_failures,
        "evaluation cycle complete"
    );

    if summary.changes > 0 {
        state.increment_version();
    }
    *state.last_cycle.write() = Some(summary.clone());
    summary
}
