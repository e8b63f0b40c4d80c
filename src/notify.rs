// =============================================================================
// Notification boundary — payloads, notifier trait, periodic digest
// =============================================================================
//
// Delivery (webhooks, e-mail, chat) belongs to an outside collaborator. The
// engine hands it a `NotificationPayload` whenever an instrument/horizon
// enters golden_opportunity, buy or sell, a `Digest` every
// `digest_interval_hours`, and a `WeeklyReport` built from the notifications
// issued over the past seven days. `LogNotifier` is the bundled
// implementation and writes everything through `tracing`.
// =============================================================================

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::app_state::AppState;
use crate::classifier::Classification;
use crate::types::{Category, ConfidenceLevel, Direction, Horizon, RiskLevel};

/// Length of the weekly report window.
pub const WEEK_DAYS: i64 = 7;

/// Instruments listed in the weekly report's top-bullish table.
const WEEKLY_TOP_N: usize = 5;

/// Outbound alert for one newly actionable classification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub instrument_id: String,
    pub horizon: Horizon,
    pub category: Category,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub risk_level: RiskLevel,
    pub direction: Direction,
    pub rationale: Vec<String>,
    pub issued_at: DateTime<Utc>,
}

impl NotificationPayload {
    pub fn from_classification(c: &Classification, issued_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instrument_id: c.instrument_id.clone(),
            horizon: c.horizon(),
            category: c.category,
            confidence: c.confidence(),
            confidence_level: c.confidence_level,
            risk_level: c.risk_level,
            direction: c.score.direction,
            rationale: c.rationale.clone(),
            issued_at,
        }
    }
}

/// Delivery collaborator.
pub trait Notifier: Send + Sync {
    fn notify(&self, payload: &NotificationPayload) -> Result<()>;

    fn publish_digest(&self, digest: &Digest) -> Result<()>;

    fn publish_weekly(&self, report: &WeeklyReport) -> Result<()>;
}

/// Writes notifications and digests to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, payload: &NotificationPayload) -> Result<()> {
        info!(
            id = %payload.id,
            symbol = %payload.instrument_id,
            horizon = %payload.horizon,
            category = %payload.category,
            direction = %payload.direction,
            confidence = payload.confidence,
            confidence_level = %payload.confidence_level,
            risk = %payload.risk_level,
            rationale = ?payload.rationale,
            "opportunity"
        );
        Ok(())
    }

    fn publish_digest(&self, digest: &Digest) -> Result<()> {
        info!(
            generated_at = %digest.generated_at,
            counts = ?digest.counts,
            golden = digest.golden_opportunities.len(),
            recommendations = digest.recommendations.len(),
            "digest"
        );
        for entry in digest.golden_opportunities.iter().chain(&digest.recommendations) {
            info!(
                symbol = %entry.instrument_id,
                horizon = %entry.horizon,
                category = %entry.category,
                confidence = entry.confidence,
                risk = %entry.risk_level,
                "digest entry"
            );
        }
        Ok(())
    }

    fn publish_weekly(&self, report: &WeeklyReport) -> Result<()> {
        info!(
            from = %report.period_start,
            to = %report.period_end,
            golden = report.golden_opportunities.len(),
            bullish = report.bullish_opportunities,
            bearish = report.bearish_opportunities,
            buys = report.buy_count,
            sells = report.sell_count,
            "weekly report"
        );
        for (day, counts) in &report.days {
            info!(%day, bullish = counts.bullish, bearish = counts.bearish, "weekly report day");
        }
        for top in &report.top_bullish {
            info!(symbol = %top.instrument_id, count = top.count, "weekly top bullish");
        }
        Ok(())
    }
}

// =============================================================================
// Digest
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DigestEntry {
    pub instrument_id: String,
    pub horizon: Horizon,
    pub category: Category,
    pub direction: Direction,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub risk_level: RiskLevel,
    pub rationale: Vec<String>,
}

impl From<&Classification> for DigestEntry {
    fn from(c: &Classification) -> Self {
        Self {
            instrument_id: c.instrument_id.clone(),
            horizon: c.horizon(),
            category: c.category,
            direction: c.score.direction,
            confidence: c.confidence(),
            confidence_level: c.confidence_level,
            risk_level: c.risk_level,
            rationale: c.rationale.clone(),
        }
    }
}

/// Summary of every current classification.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub state_version: u64,
    /// Current classifications per category (stale ones excluded).
    pub counts: BTreeMap<Category, usize>,
    /// Highest confidence first.
    pub golden_opportunities: Vec<DigestEntry>,
    /// Buy and sell recommendations, highest confidence first.
    pub recommendations: Vec<DigestEntry>,
}

pub fn build_digest(state: &AppState, generated_at: DateTime<Utc>) -> Digest {
    let current = state.current_classifications();

    let mut counts: BTreeMap<Category, usize> = Category::ALL.iter().map(|c| (*c, 0)).collect();
    for c in &current {
        *counts.entry(c.category).or_default() += 1;
    }

    Digest {
        generated_at,
        state_version: state.current_state_version(),
        counts,
        golden_opportunities: current
            .iter()
            .filter(|c| c.category == Category::GoldenOpportunity)
            .map(DigestEntry::from)
            .collect(),
        recommendations: current
            .iter()
            .filter(|c| matches!(c.category, Category::Buy | Category::Sell))
            .map(DigestEntry::from)
            .collect(),
    }
}

// =============================================================================
// Weekly report
// =============================================================================

/// Golden opportunities issued on one day, by direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub bullish: usize,
    pub bearish: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentCount {
    pub instrument_id: String,
    pub count: usize,
}

/// What the engine announced over the past week.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Golden opportunities issued in the window, oldest first.
    pub golden_opportunities: Vec<NotificationPayload>,
    pub bullish_opportunities: usize,
    pub bearish_opportunities: usize,
    /// Golden opportunities per UTC day.
    pub days: BTreeMap<NaiveDate, DayCount>,
    pub buy_count: usize,
    pub sell_count: usize,
    /// Instruments with the most bullish golden opportunities.
    pub top_bullish: Vec<InstrumentCount>,
}

pub fn build_weekly_report(state: &AppState, now: DateTime<Utc>) -> WeeklyReport {
    let period_start = now - Duration::days(WEEK_DAYS);
    let issued: Vec<NotificationPayload> = state
        .notifications_since(period_start)
        .into_iter()
        .filter(|p| p.issued_at <= now)
        .collect();

    let golden: Vec<NotificationPayload> = issued
        .iter()
        .filter(|p| p.category == Category::GoldenOpportunity)
        .cloned()
        .collect();

    let mut days: BTreeMap<NaiveDate, DayCount> = BTreeMap::new();
    let mut bullish_by_instrument: BTreeMap<&str, usize> = BTreeMap::new();
    for p in &golden {
        let day = days.entry(p.issued_at.date_naive()).or_default();
        match p.direction {
            Direction::Bullish => {
                day.bullish += 1;
                *bullish_by_instrument.entry(p.instrument_id.as_str()).or_default() += 1;
            }
            Direction::Bearish => day.bearish += 1,
            Direction::Neutral => {}
        }
    }

    let mut top_bullish: Vec<InstrumentCount> = bullish_by_instrument
        .into_iter()
        .map(|(id, count)| InstrumentCount {
            instrument_id: id.to_string(),
            count,
        })
        .collect();
    // Stable sort keeps instrument order among equal counts.
    top_bullish.sort_by(|a, b| b.count.cmp(&a.count));
    top_bullish.truncate(WEEKLY_TOP_N);

    let count = |category: Category| issued.iter().filter(|p| p.category == category).count();

    WeeklyReport {
        period_start,
        period_end: now,
        bullish_opportunities: days.values().map(|d| d.bullish).sum(),
        bearish_opportunities: days.values().map(|d| d.bearish).sum(),
        golden_opportunities: golden,
        days,
        buy_count: count(Category::Buy),
        sell_count: count(Category::Sell),
        top_bullish,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::classifier::Classifier;
    use crate::market_data::series::tests::day;
    use crate::runtime_config::{tests::test_config, ConfigHandle};
    use crate::signals::signal::tests::sig;
    use crate::signals::FusionEngine;

    /// Notifier that keeps everything it is handed.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) sent: Mutex<Vec<NotificationPayload>>,
        pub(crate) digests: Mutex<Vec<Digest>>,
        pub(crate) weekly: Mutex<Vec<WeeklyReport>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, payload: &NotificationPayload) -> Result<()> {
            self.sent.lock().push(payload.clone());
            Ok(())
        }

        fn publish_digest(&self, digest: &Digest) -> Result<()> {
            self.digests.lock().push(digest.clone());
            Ok(())
        }

        fn publish_weekly(&self, report: &WeeklyReport) -> Result<()> {
            self.weekly.lock().push(report.clone());
            Ok(())
        }
    }

    fn populated_state() -> AppState {
        let cfg = test_config();
        let fusion = FusionEngine::new(cfg.thresholds.min_significance);
        let classifier = Classifier::from_config(&cfg);
        let state = AppState::new(ConfigHandle::new(cfg).unwrap());

        let golden = vec![
            sig("candlestick:hammer", Horizon::Short, Direction::Bullish, 0.9, 0.9),
            sig("breakout:20bar", Horizon::Short, Direction::Bullish, 0.7, 0.8),
        ];
        let sell = vec![sig("trend:ema_stack", Horizon::Medium, Direction::Bearish, 0.7, 0.8)];

        let book = state.book("2222.SR");
        let mut b = book.lock();
        b.apply_signals(golden.into_iter().chain(sell).collect(), Some(day(10)));
        b.recompute(&fusion, &classifier, 72.0);
        drop(b);
        state
    }

    #[test]
    fn digest_counts_and_ranks() {
        let state = populated_state();
        let digest = build_digest(&state, day(11));
        assert_eq!(digest.counts[&Category::GoldenOpportunity], 1);
        assert_eq!(digest.counts[&Category::Sell], 1);
        assert_eq!(digest.counts[&Category::None], 1);
        assert_eq!(digest.counts[&Category::Buy], 0);
        assert_eq!(digest.golden_opportunities.len(), 1);
        assert_eq!(digest.recommendations.len(), 1);
        assert_eq!(digest.recommendations[0].category, Category::Sell);
    }

    #[test]
    fn digest_serialises_category_keys() {
        let digest = build_digest(&populated_state(), day(11));
        let json = serde_json::to_value(&digest).unwrap();
        assert_eq!(json["counts"]["golden_opportunity"], 1);
    }

    #[test]
    fn payload_carries_classification() {
        let state = populated_state();
        let golden = state.classifications_by_category(Category::GoldenOpportunity);
        let payload = NotificationPayload::from_classification(&golden[0], day(11));
        assert_eq!(payload.instrument_id, "2222.SR");
        assert_eq!(payload.horizon, Horizon::Short);
        assert_eq!(payload.direction, Direction::Bullish);
        assert!((payload.confidence - 1.0).abs() < 1e-12);
        assert_eq!(payload.confidence_level, ConfidenceLevel::High);
        assert_eq!(payload.risk_level, RiskLevel::LowToMedium);
        assert!(uuid::Uuid::parse_str(&payload.id).is_ok());
        assert!(LogNotifier.notify(&payload).is_ok());
    }

    fn issue(state: &AppState, id: &str, category: Category, direction: Direction, at: DateTime<Utc>) {
        let classification = state
            .current_classifications()
            .into_iter()
            .find(|c| c.category == Category::GoldenOpportunity)
            .unwrap();
        let mut payload = NotificationPayload::from_classification(&classification, at);
        payload.instrument_id = id.to_string();
        payload.category = category;
        payload.direction = direction;
        state.record_notification(payload);
    }

    #[test]
    fn weekly_report_groups_golden_by_day_and_counts_recommendations() {
        let state = populated_state();
        let hour = |d: i64, h: i64| day(d) + Duration::hours(h);

        // Outside the window.
        issue(&state, "2222.SR", Category::GoldenOpportunity, Direction::Bullish, day(2));
        issue(&state, "2222.SR", Category::GoldenOpportunity, Direction::Bullish, hour(10, 1));
        issue(&state, "2222.SR", Category::GoldenOpportunity, Direction::Bullish, hour(10, 5));
        issue(&state, "1120.SR", Category::GoldenOpportunity, Direction::Bearish, hour(10, 6));
        issue(&state, "1120.SR", Category::GoldenOpportunity, Direction::Bullish, hour(12, 2));
        issue(&state, "2010.SR", Category::Buy, Direction::Bullish, hour(11, 0));
        issue(&state, "7010.SR", Category::Sell, Direction::Bearish, hour(12, 0));
        issue(&state, "1180.SR", Category::Sell, Direction::Bearish, hour(13, 0));

        let report = build_weekly_report(&state, day(14));
        assert_eq!(report.period_start, day(7));
        assert_eq!(report.golden_opportunities.len(), 4);
        assert_eq!(report.bullish_opportunities, 3);
        assert_eq!(report.bearish_opportunities, 1);
        assert_eq!(report.buy_count, 1);
        assert_eq!(report.sell_count, 2);

        assert_eq!(report.days.len(), 2);
        assert_eq!(report.days[&day(10).date_naive()], DayCount { bullish: 2, bearish: 1 });
        assert_eq!(report.days[&day(12).date_naive()], DayCount { bullish: 1, bearish: 0 });

        assert_eq!(
            report.top_bullish,
            vec![
                InstrumentCount { instrument_id: "2222.SR".into(), count: 2 },
                InstrumentCount { instrument_id: "1120.SR".into(), count: 1 },
            ]
        );

        let notifier = RecordingNotifier::default();
        notifier.publish_weekly(&report).unwrap();
        assert!(LogNotifier.publish_weekly(&report).is_ok());
        assert_eq!(notifier.weekly.lock().len(), 1);
    }

    #[test]
    fn weekly_report_serialises_days_as_dates() {
        let state = populated_state();
        issue(&state, "2222.SR", Category::GoldenOpportunity, Direction::Bullish, day(10));
        let json = serde_json::to_value(build_weekly_report(&state, day(11))).unwrap();
        let key = day(10).date_naive().to_string();
        assert_eq!(json["days"][key.as_str()]["bullish"], 1);
    }
}
