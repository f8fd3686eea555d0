//! Earnings strategy registry.
//!
//! Each strategy is a pure predicate over a `SymbolSnapshot`. The registry
//! table decides which symbols a strategy sees and which watch list its hits
//! feed.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::fmt;

use crate::analysis::snapshot::SymbolSnapshot;
use crate::error::ScreenerError;
use crate::models::Thresholds;
use crate::utils::add_months_clamped;

/// Inputs shared by every strategy evaluation in a run
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub thresholds: &'a Thresholds,
    pub as_of: NaiveDate,
}

/// Result of one strategy on one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub passed: bool,
    pub detail: String,
}

impl Verdict {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self { passed: true, detail: detail.into() }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self { passed: false, detail: detail.into() }
    }
}

/// Which symbols a strategy is evaluated on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Universe {
    /// Symbols named in the upcoming-earnings release files
    ReleaseList,
    /// Every symbol with earnings history
    AllEarnings,
    /// Symbols in the configured momentum sectors
    Sectors,
}

/// Watch list a strategy's hits feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TargetList {
    NextWeek,
    Notification,
    EarningFilter,
}

impl TargetList {
    /// Group name in the panel file
    pub fn group_name(&self) -> &'static str {
        match self {
            TargetList::NextWeek => "Next_Week",
            TargetList::Notification => "Notification",
            TargetList::EarningFilter => "Earning_Filter",
        }
    }
}

impl fmt::Display for TargetList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.group_name())
    }
}

pub type StrategyFn = fn(&SymbolSnapshot, &EvalContext) -> Verdict;

#[derive(Clone, Copy)]
pub struct StrategyDef {
    pub name: &'static str,
    pub description: &'static str,
    pub universe: Universe,
    pub list: TargetList,
    pub eval: StrategyFn,
}

impl StrategyDef {
    pub fn evaluate(&self, snapshot: &SymbolSnapshot, ctx: &EvalContext) -> Verdict {
        (self.eval)(snapshot, ctx)
    }
}

impl fmt::Debug for StrategyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyDef")
            .field("name", &self.name)
            .field("universe", &self.universe)
            .field("list", &self.list)
            .finish()
    }
}

/// Strategies run by the earnings-season screen
pub fn season_strategies() -> Vec<StrategyDef> {
    vec![
        StrategyDef {
            name: "below_all_earnings",
            description: "latest close below every recent earnings-day close by min_drop_pct",
            universe: Universe::ReleaseList,
            list: TargetList::NextWeek,
            eval: below_all_earnings,
        },
        StrategyDef {
            name: "rising_pullback",
            description: "rising earnings closes, latest close min_drop_pct below the last one, min_gap_days after it",
            universe: Universe::ReleaseList,
            list: TargetList::NextWeek,
            eval: rising_pullback,
        },
        StrategyDef {
            name: "rising_deep_high",
            description: "rising earnings closes and one of the last deep_lookback closes high_margin_pct above the latest",
            universe: Universe::ReleaseList,
            list: TargetList::NextWeek,
            eval: rising_deep_high,
        },
        StrategyDef {
            name: "pre_earnings_window",
            description: "latest close under every earnings close inside the window before the next report",
            universe: Universe::AllEarnings,
            list: TargetList::Notification,
            eval: pre_earnings_window_eval,
        },
        StrategyDef {
            name: "pre_earnings_deep_high",
            description: "rising last report and an older earnings close high_margin_pct above the latest, inside the pre-report window",
            universe: Universe::AllEarnings,
            list: TargetList::Notification,
            eval: pre_earnings_deep_high,
        },
        StrategyDef {
            name: "post_earnings_fade",
            description: "fresh positive report on rising closes that already gave back its earnings-day peak",
            universe: Universe::AllEarnings,
            list: TargetList::Notification,
            eval: post_earnings_fade,
        },
    ]
}

/// Strategies run by the off-season momentum screen
pub fn momentum_strategies() -> Vec<StrategyDef> {
    vec![StrategyDef {
        name: "earnings_momentum",
        description: "positive or above-average last report, price pulled back by the size-dependent drop, liquid",
        universe: Universe::Sectors,
        list: TargetList::EarningFilter,
        eval: earnings_momentum,
    }]
}

pub fn all_strategies() -> Vec<StrategyDef> {
    let mut all = season_strategies();
    all.extend(momentum_strategies());
    all
}

pub fn find_strategy(name: &str) -> Result<StrategyDef, ScreenerError> {
    all_strategies()
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| ScreenerError::UnknownStrategy(name.to_string()))
}

pub fn evaluate(def: &StrategyDef, snapshot: &SymbolSnapshot, ctx: &EvalContext) -> Verdict {
    def.evaluate(snapshot, ctx)
}

/// Window before the estimated next report, as `(start, end)` inclusive
pub fn pre_earnings_window(last_earnings: NaiveDate, t: &Thresholds) -> (NaiveDate, NaiveDate) {
    let next = add_months_clamped(last_earnings, t.next_earnings_months);
    (
        next - Duration::days(t.pre_window_start_days),
        next - Duration::days(t.pre_window_end_days),
    )
}

fn below_all_earnings(s: &SymbolSnapshot, ctx: &EvalContext) -> Verdict {
    let t = ctx.thresholds;
    let Some(closes) = s.earnings_closes(t.num_earnings) else {
        return Verdict::fail("earnings closes incomplete");
    };
    let factor = 1.0 - t.min_drop_pct;
    let latest = s.latest.close;

    match closes.iter().find(|&&p| latest >= p * factor) {
        Some(p) => Verdict::fail(format!(
            "latest {:.2} is not {:.0}% below earnings close {:.2}",
            latest,
            t.min_drop_pct * 100.0,
            p
        )),
        None => Verdict::pass(format!(
            "latest {:.2} is {:.0}% below all of {:?}",
            latest,
            t.min_drop_pct * 100.0,
            closes
        )),
    }
}

fn rising_pullback(s: &SymbolSnapshot, ctx: &EvalContext) -> Verdict {
    let t = ctx.thresholds;
    let Some(closes) = s.earnings_closes(t.num_earnings) else {
        return Verdict::fail("earnings closes incomplete");
    };
    if !s.is_rising(t.num_earnings) {
        return Verdict::fail(format!("earnings closes {:?} are not rising", closes));
    }
    let gap = s.days_since_earnings();
    if gap < t.min_gap_days {
        return Verdict::fail(format!("only {} days since earnings (< {})", gap, t.min_gap_days));
    }
    let limit = closes[0] * (1.0 - t.min_drop_pct);
    if s.latest.close < limit {
        Verdict::pass(format!("latest {:.2} < {:.2} after rising closes {:?}", s.latest.close, limit, closes))
    } else {
        Verdict::fail(format!("latest {:.2} >= {:.2}", s.latest.close, limit))
    }
}

/// Some of the last `deep_lookback` earnings closes sits more than
/// `high_margin_pct` above the latest close.
fn has_deep_high(s: &SymbolSnapshot, t: &Thresholds) -> Result<f64, String> {
    let Some(deep) = s.earnings_closes(t.deep_lookback) else {
        return Err(format!("fewer than {} earnings closes", t.deep_lookback));
    };
    let bar = s.latest.close * (1.0 + t.high_margin_pct);
    deep.iter()
        .copied()
        .filter(|p| *p > bar)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
        .ok_or_else(|| format!("no earnings close above {:.2} in {:?}", bar, deep))
}

fn rising_deep_high(s: &SymbolSnapshot, ctx: &EvalContext) -> Verdict {
    let t = ctx.thresholds;
    if !s.is_rising(t.num_earnings) {
        return Verdict::fail("earnings closes are not rising");
    }
    let gap = s.days_since_earnings();
    if gap < t.min_gap_days {
        return Verdict::fail(format!("only {} days since earnings (< {})", gap, t.min_gap_days));
    }
    match has_deep_high(s, t) {
        Ok(high) => Verdict::pass(format!(
            "earnings close {:.2} is more than {:.0}% above latest {:.2}",
            high,
            t.high_margin_pct * 100.0,
            s.latest.close
        )),
        Err(why) => Verdict::fail(why),
    }
}

fn in_pre_window(s: &SymbolSnapshot, t: &Thresholds) -> Result<(), String> {
    let (start, end) = pre_earnings_window(s.latest_earnings_date(), t);
    if s.latest.date >= start && s.latest.date <= end {
        Ok(())
    } else {
        Err(format!("latest date {} outside window {}..={}", s.latest.date, start, end))
    }
}

fn pre_earnings_window_eval(s: &SymbolSnapshot, ctx: &EvalContext) -> Verdict {
    let t = ctx.thresholds;
    let Some(closes) = s.earnings_closes(t.num_earnings) else {
        return Verdict::fail("earnings closes incomplete");
    };
    let latest = s.latest.close;
    let (newest, previous) = (closes[0], closes[1]);
    let max = closes.iter().copied().fold(f64::MIN, f64::max);
    let min = closes.iter().copied().fold(f64::MAX, f64::min);

    let price_ok = if previous < newest {
        latest < max * (1.0 - t.rise_drop_pct)
    } else {
        (newest - previous).abs() >= previous * t.min_drop_pct
    };
    if !price_ok {
        return Verdict::fail(format!("price rule failed for closes {:?}, latest {:.2}", closes, latest));
    }
    if latest >= min {
        return Verdict::fail(format!("latest {:.2} not below lowest earnings close {:.2}", latest, min));
    }
    match in_pre_window(s, t) {
        Ok(()) => Verdict::pass(format!("latest {:.2} below {:?} inside pre-report window", latest, closes)),
        Err(why) => Verdict::fail(why),
    }
}

fn pre_earnings_deep_high(s: &SymbolSnapshot, ctx: &EvalContext) -> Verdict {
    let t = ctx.thresholds;
    let Some(closes) = s.earnings_closes(2) else {
        return Verdict::fail("earnings closes incomplete");
    };
    if closes[1] >= closes[0] {
        return Verdict::fail(format!("last report did not rise: {:?}", closes));
    }
    if let Err(why) = has_deep_high(s, t) {
        return Verdict::fail(why);
    }
    match in_pre_window(s, t) {
        Ok(()) => Verdict::pass("deep earnings high inside pre-report window"),
        Err(why) => Verdict::fail(why),
    }
}

fn post_earnings_fade(s: &SymbolSnapshot, ctx: &EvalContext) -> Verdict {
    let t = ctx.thresholds;
    let Some(closes) = s.earnings_closes(t.num_earnings) else {
        return Verdict::fail("earnings closes incomplete");
    };
    if !s.is_rising(t.num_earnings) {
        return Verdict::fail(format!("earnings closes {:?} are not rising", closes));
    }
    let er0 = s.latest_earnings_date();
    if er0 < ctx.as_of - Duration::days(t.recent_earnings_days) {
        return Verdict::fail(format!("last report {} older than {} days", er0, t.recent_earnings_days));
    }
    match s.latest_earnings_change {
        Some(change) if change > 0.0 => {}
        other => return Verdict::fail(format!("earnings reaction {:?} is not positive", other)),
    }

    let latest = s.latest.close;
    let window_start = er0 + Duration::days(t.fade_window_start_days);
    let window_end = er0 + Duration::days(t.fade_window_end_days);
    let drop = t.drop_for_market_cap(s.market_cap);

    let faded_from_peak = s.latest.date >= window_start
        && s.latest.date <= window_end
        && s.peak_close_near_earnings.is_some_and(|peak| latest < peak * (1.0 - drop));
    let below_previous = latest < closes[1];

    if faded_from_peak || below_previous {
        Verdict::pass(format!(
            "window {}..={}, latest {:.2}, drop {:.0}%, peak {:?}, previous report close {:.2}",
            window_start,
            window_end,
            latest,
            drop * 100.0,
            s.peak_close_near_earnings,
            closes[1]
        ))
    } else {
        Verdict::fail(format!(
            "latest {:.2} neither {:.0}% under peak {:?} in window nor under previous report close {:.2}",
            latest,
            drop * 100.0,
            s.peak_close_near_earnings,
            closes[1]
        ))
    }
}

fn earnings_momentum(s: &SymbolSnapshot, ctx: &EvalContext) -> Verdict {
    let t = ctx.thresholds;
    let Some(closes) = s.earnings_closes(t.num_earnings) else {
        return Verdict::fail("earnings closes incomplete");
    };
    let mean = closes.iter().sum::<f64>() / closes.len() as f64;
    let positive_reaction = s.latest_earnings_change.is_some_and(|c| c > 0.0);
    if !(positive_reaction || closes[0] > mean) {
        return Verdict::fail(format!(
            "reaction {:?} not positive and last close {:.2} not above mean {:.2}",
            s.latest_earnings_change, closes[0], mean
        ));
    }

    let drop = t.drop_for_market_cap(s.market_cap);
    let limit = closes[0] * (1.0 - drop);
    if s.latest.close > limit {
        return Verdict::fail(format!("latest {:.2} above {:.2}", s.latest.close, limit));
    }

    match s.turnover() {
        Some(turnover) if turnover >= t.min_turnover => Verdict::pass(format!(
            "latest {:.2} <= {:.2}, turnover {:.0}",
            s.latest.close, limit, turnover
        )),
        other => Verdict::fail(format!("turnover {:?} under {:.0}", other, t.min_turnover)),
    }
}
