//! Post-filters applied to strategy hits before they reach a watch list.
//!
//! Each list runs its own ordered chain; the first failing step drops the symbol.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::analysis::snapshot::{SnapshotSet, SymbolSnapshot};
use crate::analysis::trace::TraceLog;
use crate::models::Thresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStep {
    HasSnapshot,
    NotBlacklisted,
    NoRecentNegativeEarnings,
    MinTurnover,
    ValidPe,
    NotOnEarningsDate,
    NotExcluded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterReason {
    NoSnapshot,
    Blacklisted,
    RecentNegativeEarnings,
    LowTurnover(Option<f64>),
    InvalidPe(Option<String>),
    TradedOnEarningsDate,
    AlreadyListed,
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::NoSnapshot => write!(f, "no snapshot"),
            FilterReason::Blacklisted => write!(f, "blacklisted"),
            FilterReason::RecentNegativeEarnings => write!(f, "negative earnings reaction in the recent window"),
            FilterReason::LowTurnover(Some(t)) => write!(f, "turnover {:.0} below minimum", t),
            FilterReason::LowTurnover(None) => write!(f, "turnover unknown"),
            FilterReason::InvalidPe(pe) => write!(f, "invalid P/E {:?}", pe),
            FilterReason::TradedOnEarningsDate => write!(f, "latest bar is the earnings date"),
            FilterReason::AlreadyListed => write!(f, "already on another watch list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Keep,
    Drop(FilterReason),
}

/// Chain for the Next_Week list
pub const NEXT_WEEK_FILTERS: &[FilterStep] = &[
    FilterStep::HasSnapshot,
    FilterStep::NotBlacklisted,
    FilterStep::NoRecentNegativeEarnings,
    FilterStep::MinTurnover,
    FilterStep::ValidPe,
    FilterStep::NotOnEarningsDate,
];

/// Chain for the Notification list
pub const NOTIFICATION_FILTERS: &[FilterStep] = &[
    FilterStep::HasSnapshot,
    FilterStep::NotBlacklisted,
    FilterStep::MinTurnover,
    FilterStep::ValidPe,
    FilterStep::NotOnEarningsDate,
];

/// Chain for the momentum screen; turnover is part of the strategy itself
pub const MOMENTUM_FILTERS: &[FilterStep] = &[
    FilterStep::HasSnapshot,
    FilterStep::ValidPe,
    FilterStep::NotOnEarningsDate,
    FilterStep::NotBlacklisted,
    FilterStep::NotExcluded,
];

/// Sets and thresholds the filter steps consult
pub struct FilterContext<'a> {
    pub thresholds: &'a Thresholds,
    pub blacklist: &'a HashSet<String>,
    pub negative_earnings: &'a HashSet<String>,
    pub excluded: &'a HashSet<String>,
}

impl FilterStep {
    pub fn check(&self, symbol: &str, snapshot: Option<&SymbolSnapshot>, ctx: &FilterContext) -> FilterDecision {
        let Some(snap) = snapshot else {
            return FilterDecision::Drop(FilterReason::NoSnapshot);
        };
        let keep = |ok: bool, reason: FilterReason| {
            if ok {
                FilterDecision::Keep
            } else {
                FilterDecision::Drop(reason)
            }
        };

        match self {
            FilterStep::HasSnapshot => FilterDecision::Keep,
            FilterStep::NotBlacklisted => keep(!ctx.blacklist.contains(symbol), FilterReason::Blacklisted),
            FilterStep::NoRecentNegativeEarnings => keep(
                !ctx.negative_earnings.contains(symbol),
                FilterReason::RecentNegativeEarnings,
            ),
            FilterStep::MinTurnover => {
                let turnover = snap.turnover();
                keep(
                    turnover.is_some_and(|t| t >= ctx.thresholds.min_turnover),
                    FilterReason::LowTurnover(turnover),
                )
            }
            FilterStep::ValidPe => keep(snap.has_valid_pe(), FilterReason::InvalidPe(snap.pe_ratio.clone())),
            FilterStep::NotOnEarningsDate => keep(
                snap.latest.date != snap.latest_earnings_date(),
                FilterReason::TradedOnEarningsDate,
            ),
            FilterStep::NotExcluded => keep(!ctx.excluded.contains(symbol), FilterReason::AlreadyListed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    /// Sorted, deduplicated survivors
    pub kept: Vec<String>,
    pub dropped: BTreeMap<String, FilterReason>,
}

impl FilterOutcome {
    /// Survivors plus symbols dropped for being blacklisted or already listed
    /// elsewhere. Only meaningful for `MOMENTUM_FILTERS`, where those two
    /// steps run after every data check.
    pub fn qualified(&self) -> Vec<String> {
        let mut all: BTreeSet<String> = self.kept.iter().cloned().collect();
        all.extend(
            self.dropped
                .iter()
                .filter(|(_, reason)| matches!(reason, FilterReason::Blacklisted | FilterReason::AlreadyListed))
                .map(|(symbol, _)| symbol.clone()),
        );
        all.into_iter().collect()
    }
}

pub fn apply_filters<I>(
    candidates: I,
    steps: &[FilterStep],
    snapshots: &SnapshotSet,
    ctx: &FilterContext,
    trace: &TraceLog,
) -> FilterOutcome
where
    I: IntoIterator<Item = String>,
{
    let unique: BTreeSet<String> = candidates.into_iter().collect();
    let mut outcome = FilterOutcome::default();

    'symbols: for symbol in unique {
        let snapshot = snapshots.get(&symbol);
        for step in steps {
            if let FilterDecision::Drop(reason) = step.check(&symbol, snapshot, ctx) {
                trace.note(&symbol, || format!("filtered out at {:?}: {}", step, reason));
                outcome.dropped.insert(symbol, reason);
                continue 'symbols;
            }
        }
        trace.note(&symbol, || "passed all filters".to_string());
        outcome.kept.push(symbol);
    }
    outcome
}
