// =============================================================================
// Candlestick Patterns
// =============================================================================
//
// One-, two- and three-bar reversal / continuation patterns read from the bars
// ending at the last bar. Each recognised pattern emits one short-horizon
// signal named `candlestick:<pattern>`:
//
//   doji                         neutral    body ≤ 10 % of range
//   hammer                       bullish    long lower shadow after a decline
//   shooting_star                bearish    long upper shadow after a rise
//   bullish_engulfing            bullish    up body swallows prior down body
//   bearish_engulfing            bearish    down body swallows prior up body
//   morning_star                 bullish    down, small, up past mid of first
//   evening_star                 bearish    up, small, down past mid of first
//   three_white_soldiers         bullish    three rising up bodies
//   three_black_crows            bearish    three falling down bodies
// =============================================================================

use crate::indicators::emit;
use crate::market_data::PriceBar;
use crate::signals::Signal;
use crate::types::{Direction, Horizon};

pub const MIN_BARS: usize = 3;

const DOJI_BODY_RATIO: f64 = 0.1;
const SHADOW_TO_BODY: f64 = 2.0;
const SMALL_SHADOW_RATIO: f64 = 0.25;
const STAR_BODY_RATIO: f64 = 0.3;
const LARGE_BODY_RATIO: f64 = 0.5;

/// A recognised pattern with its raw strength in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub pattern: &'static str,
    pub direction: Direction,
    pub strength: f64,
    pub reliability: f64,
}

/// Every pattern that completes on the last bar of `bars`.
pub fn detect_patterns(bars: &[PriceBar]) -> Vec<PatternMatch> {
    let n = bars.len();
    if n < MIN_BARS {
        return Vec::new();
    }
    let (a, b, c) = (&bars[n - 3], &bars[n - 2], &bars[n - 1]);

    [
        doji(c),
        hammer(b, c),
        shooting_star(b, c),
        engulfing(b, c),
        star(a, b, c),
        three_in_a_row(a, b, c),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Signals for every pattern on the last bar.
pub fn pattern_signals(instrument_id: &str, bars: &[PriceBar]) -> Vec<Signal> {
    detect_patterns(bars)
        .into_iter()
        .filter_map(|m| {
            emit(
                instrument_id,
                bars,
                format!("candlestick:{}", m.pattern),
                Horizon::Short,
                m.direction,
                m.strength,
                m.reliability,
            )
        })
        .collect()
}

fn doji(c: &PriceBar) -> Option<PatternMatch> {
    let range = c.range();
    if range <= 0.0 || c.body() > DOJI_BODY_RATIO * range {
        return None;
    }
    Some(PatternMatch {
        pattern: "doji",
        direction: Direction::Neutral,
        strength: 1.0 - c.body() / (DOJI_BODY_RATIO * range),
        reliability: 0.4,
    })
}

fn hammer(prev: &PriceBar, c: &PriceBar) -> Option<PatternMatch> {
    let range = c.range();
    let after_decline = prev.is_bearish() && c.low < prev.low;
    if range <= 0.0
        || !after_decline
        || c.lower_shadow() < SHADOW_TO_BODY * c.body()
        || c.upper_shadow() > SMALL_SHADOW_RATIO * range
    {
        return None;
    }
    Some(PatternMatch {
        pattern: "hammer",
        direction: Direction::Bullish,
        strength: c.lower_shadow() / range,
        reliability: 0.6,
    })
}

fn shooting_star(prev: &PriceBar, c: &PriceBar) -> Option<PatternMatch> {
    let range = c.range();
    let after_rise = prev.is_bullish() && c.high > prev.high;
    if range <= 0.0
        || !after_rise
        || c.upper_shadow() < SHADOW_TO_BODY * c.body()
        || c.lower_shadow() > SMALL_SHADOW_RATIO * range
    {
        return None;
    }
    Some(PatternMatch {
        pattern: "shooting_star",
        direction: Direction::Bearish,
        strength: c.upper_shadow() / range,
        reliability: 0.6,
    })
}

fn engulfing(prev: &PriceBar, c: &PriceBar) -> Option<PatternMatch> {
    if c.body() <= prev.body() || prev.body() <= 0.0 {
        return None;
    }
    // Strength grows as the prior body shrinks relative to the engulfing one.
    let strength = 0.5 + 0.5 * (1.0 - prev.body() / c.body());

    if prev.is_bearish() && c.is_bullish() && c.open <= prev.close && c.close >= prev.open {
        return Some(PatternMatch {
            pattern: "bullish_engulfing",
            direction: Direction::Bullish,
            strength,
            reliability: 0.7,
        });
    }
    if prev.is_bullish() && c.is_bearish() && c.open >= prev.close && c.close <= prev.open {
        return Some(PatternMatch {
            pattern: "bearish_engulfing",
            direction: Direction::Bearish,
            strength,
            reliability: 0.7,
        });
    }
    None
}

fn star(a: &PriceBar, b: &PriceBar, c: &PriceBar) -> Option<PatternMatch> {
    let first_body = a.body();
    if a.range() <= 0.0
        || first_body < LARGE_BODY_RATIO * a.range()
        || b.body() > STAR_BODY_RATIO * first_body
    {
        return None;
    }
    let mid = (a.open + a.close) / 2.0;

    if a.is_bearish() && c.is_bullish() && c.close > mid {
        return Some(PatternMatch {
            pattern: "morning_star",
            direction: Direction::Bullish,
            strength: (c.close - a.close) / first_body,
            reliability: 0.75,
        });
    }
    if a.is_bullish() && c.is_bearish() && c.close < mid {
        return Some(PatternMatch {
            pattern: "evening_star",
            direction: Direction::Bearish,
            strength: (a.close - c.close) / first_body,
            reliability: 0.75,
        });
    }
    None
}

fn three_in_a_row(a: &PriceBar, b: &PriceBar, c: &PriceBar) -> Option<PatternMatch> {
    let bars = [a, b, c];
    let body_share = bars
        .iter()
        .map(|x| if x.range() > 0.0 { x.body() / x.range() } else { 0.0 })
        .sum::<f64>()
        / 3.0;

    let opens_inside = |prev: &PriceBar, cur: &PriceBar| {
        cur.open >= prev.open.min(prev.close) && cur.open <= prev.open.max(prev.close)
    };

    if bars.iter().all(|x| x.is_bullish())
        && b.close > a.close
        && c.close > b.close
        && opens_inside(a, b)
        && opens_inside(b, c)
        && bars.iter().all(|x| x.upper_shadow() <= SMALL_SHADOW_RATIO * x.range())
    {
        return Some(PatternMatch {
            pattern: "three_white_soldiers",
            direction: Direction::Bullish,
            strength: body_share,
            reliability: 0.7,
        });
    }
    if bars.iter().all(|x| x.is_bearish())
        && b.close < a.close
        && c.close < b.close
        && opens_inside(a, b)
        && opens_inside(b, c)
        && bars.iter().all(|x| x.lower_shadow() <= SMALL_SHADOW_RATIO * x.range())
    {
        return Some(PatternMatch {
            pattern: "three_black_crows",
            direction: Direction::Bearish,
            strength: body_share,
            reliability: 0.7,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::series::tests::bar;

    fn names(bars: &[PriceBar]) -> Vec<&'static str> {
        detect_patterns(bars).iter().map(|m| m.pattern).collect()
    }

    #[test]
    fn too_few_bars() {
        assert!(detect_patterns(&[bar(0, 10.0, 11.0, 9.0, 10.0)]).is_empty());
    }

    #[test]
    fn doji_is_neutral() {
        let bars = vec![
            bar(0, 100.0, 101.0, 99.0, 100.5),
            bar(1, 100.5, 101.0, 99.5, 100.8),
            bar(2, 100.0, 102.0, 98.0, 100.05),
        ];
        let found = detect_patterns(&bars);
        let doji = found.iter().find(|m| m.pattern == "doji").unwrap();
        assert_eq!(doji.direction, Direction::Neutral);
        assert!(doji.strength > 0.5);
    }

    #[test]
    fn hammer_after_decline() {
        let bars = vec![
            bar(0, 105.0, 105.5, 102.0, 102.5),
            bar(1, 102.5, 103.0, 99.0, 99.5),
            bar(2, 99.0, 99.8, 95.0, 99.6),
        ];
        assert!(names(&bars).contains(&"hammer"));
        assert!(!names(&bars).contains(&"shooting_star"));
    }

    #[test]
    fn shooting_star_after_rise() {
        let bars = vec![
            bar(0, 95.0, 98.0, 94.5, 97.5),
            bar(1, 97.5, 101.0, 97.0, 100.5),
            bar(2, 101.0, 105.0, 100.2, 100.4),
        ];
        assert!(names(&bars).contains(&"shooting_star"));
    }

    #[test]
    fn engulfing_both_ways() {
        let bull = vec![
            bar(0, 100.0, 101.0, 99.0, 100.0),
            bar(1, 101.0, 101.2, 99.8, 100.0),
            bar(2, 99.8, 102.5, 99.5, 102.0),
        ];
        assert!(names(&bull).contains(&"bullish_engulfing"));

        let bear = vec![
            bar(0, 100.0, 101.0, 99.0, 100.0),
            bar(1, 100.0, 101.2, 99.8, 101.0),
            bar(2, 101.2, 101.5, 98.5, 99.0),
        ];
        assert!(names(&bear).contains(&"bearish_engulfing"));
    }

    #[test]
    fn morning_and_evening_star() {
        let morning = vec![
            bar(0, 110.0, 110.5, 101.5, 102.0),
            bar(1, 101.0, 101.8, 100.0, 101.2),
            bar(2, 102.0, 108.5, 101.8, 108.0),
        ];
        let m = detect_patterns(&morning)
            .into_iter()
            .find(|m| m.pattern == "morning_star")
            .unwrap();
        assert_eq!(m.direction, Direction::Bullish);
        assert!((m.strength - 0.75).abs() < 1e-10);

        let evening = vec![
            bar(0, 100.0, 108.5, 99.5, 108.0),
            bar(1, 108.5, 109.5, 108.2, 108.8),
            bar(2, 108.0, 108.2, 101.5, 102.0),
        ];
        assert!(names(&evening).contains(&"evening_star"));
    }

    #[test]
    fn three_soldiers_and_crows() {
        let soldiers = vec![
            bar(0, 100.0, 102.2, 99.8, 102.0),
            bar(1, 101.0, 104.2, 100.8, 104.0),
            bar(2, 103.0, 106.2, 102.8, 106.0),
        ];
        assert!(names(&soldiers).contains(&"three_white_soldiers"));

        let crows = vec![
            bar(0, 106.0, 106.2, 103.8, 104.0),
            bar(1, 105.0, 105.2, 101.8, 102.0),
            bar(2, 103.0, 103.2, 99.8, 100.0),
        ];
        assert!(names(&crows).contains(&"three_black_crows"));
    }

    #[test]
    fn signals_are_short_horizon_and_prefixed() {
        let bars = vec![
            bar(0, 100.0, 102.2, 99.8, 102.0),
            bar(1, 101.0, 104.2, 100.8, 104.0),
            bar(2, 103.0, 106.2, 102.8, 106.0),
        ];
        let signals = pattern_signals("2222.SR", &bars);
        assert!(!signals.is_empty());
        for s in &signals {
            assert!(s.name.starts_with("candlestick:"));
            assert_eq!(s.horizon, Horizon::Short);
            assert_eq!(s.computed_at, bars[2].timestamp);
        }
    }
}
