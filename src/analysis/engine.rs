//! Screening engine.
//!
//! Runs the registered strategies over a snapshot set, unions hits per watch
//! list and pushes each list through its filter chain.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, info_span, Instrument};

use crate::analysis::filters::{
    apply_filters, FilterContext, FilterOutcome, MOMENTUM_FILTERS, NEXT_WEEK_FILTERS, NOTIFICATION_FILTERS,
};
use crate::analysis::snapshot::{SkipReason, SnapshotLoader, SnapshotSet};
use crate::analysis::strategies::{
    evaluate, momentum_strategies, season_strategies, EvalContext, StrategyDef, TargetList, Universe,
};
use crate::analysis::trace::TraceLog;
use crate::database::MarketDataSource;
use crate::models::Thresholds;

/// Symbols one strategy accepted, before filtering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyHits {
    pub strategy: &'static str,
    pub list: TargetList,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SeasonReport {
    pub as_of: NaiveDate,
    pub universe_size: usize,
    pub hits: Vec<StrategyHits>,
    pub next_week: FilterOutcome,
    pub notification: FilterOutcome,
    pub skipped: BTreeMap<String, SkipReason>,
    pub trace: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MomentumReport {
    pub as_of: NaiveDate,
    pub universe_size: usize,
    pub hits: Vec<StrategyHits>,
    pub earning_filter: FilterOutcome,
    pub skipped: BTreeMap<String, SkipReason>,
    pub trace: Vec<String>,
}

pub struct ScreeningEngine<'a, S: MarketDataSource> {
    source: &'a S,
    thresholds: &'a Thresholds,
    blacklist: HashSet<String>,
}

impl<'a, S: MarketDataSource> ScreeningEngine<'a, S> {
    pub fn new(source: &'a S, thresholds: &'a Thresholds) -> Self {
        Self {
            source,
            thresholds,
            blacklist: HashSet::new(),
        }
    }

    pub fn with_blacklist(mut self, blacklist: HashSet<String>) -> Self {
        self.blacklist = blacklist;
        self
    }

    /// Earnings-season screen over the release list plus every symbol with
    /// earnings history on or before `as_of`.
    pub async fn run_season(&self, release_symbols: &[String], as_of: NaiveDate, trace: &TraceLog) -> Result<SeasonReport> {
        self.season(release_symbols, as_of, trace)
            .instrument(info_span!("season", %as_of))
            .await
    }

    /// Off-season momentum screen over the configured sectors. Symbols in
    /// `excluded` are already on a season list and are dropped.
    pub async fn run_momentum(&self, as_of: NaiveDate, excluded: &HashSet<String>, trace: &TraceLog) -> Result<MomentumReport> {
        self.momentum(as_of, excluded, trace)
            .instrument(info_span!("momentum", %as_of))
            .await
    }

    async fn season(&self, release_symbols: &[String], as_of: NaiveDate, trace: &TraceLog) -> Result<SeasonReport> {
        let release: BTreeSet<String> = release_symbols.iter().map(|s| s.trim().to_uppercase()).collect();
        let mut universe = release.clone();
        universe.extend(self.source.earnings_symbols(as_of).await?);
        info!(
            "Season universe: {} symbols ({} from release lists)",
            universe.len(),
            release.len()
        );

        let universe: Vec<String> = universe.into_iter().collect();
        let snapshots = SnapshotLoader::new(self.source, self.thresholds)
            .load_many(&universe, as_of, trace)
            .await?;

        let hits = self.evaluate_all(&season_strategies(), &snapshots, &release, as_of, trace);

        let since = as_of - Duration::days(self.thresholds.recent_earnings_days);
        let negative = self.source.negative_earnings_since(since, as_of).await?;
        let excluded = HashSet::new();
        let ctx = FilterContext {
            thresholds: self.thresholds,
            blacklist: &self.blacklist,
            negative_earnings: &negative,
            excluded: &excluded,
        };

        let next_week = apply_filters(
            union_for(&hits, TargetList::NextWeek),
            NEXT_WEEK_FILTERS,
            &snapshots,
            &ctx,
            trace,
        );
        let notification = apply_filters(
            union_for(&hits, TargetList::Notification),
            NOTIFICATION_FILTERS,
            &snapshots,
            &ctx,
            trace,
        );
        info!(
            "Season result: {} next week, {} notification",
            next_week.kept.len(),
            notification.kept.len()
        );

        Ok(SeasonReport {
            as_of,
            universe_size: universe.len(),
            hits,
            next_week,
            notification,
            skipped: snapshots.skipped,
            trace: trace.lines(),
        })
    }

    async fn momentum(&self, as_of: NaiveDate, excluded: &HashSet<String>, trace: &TraceLog) -> Result<MomentumReport> {
        let universe = self.source.symbols_in_sectors(&self.thresholds.momentum_sectors).await?;
        info!(
            "Momentum universe: {} symbols in {} sectors",
            universe.len(),
            self.thresholds.momentum_sectors.len()
        );

        let snapshots = SnapshotLoader::new(self.source, self.thresholds)
            .load_many(&universe, as_of, trace)
            .await?;
        let hits = self.evaluate_all(&momentum_strategies(), &snapshots, &BTreeSet::new(), as_of, trace);

        let negative = HashSet::new();
        let ctx = FilterContext {
            thresholds: self.thresholds,
            blacklist: &self.blacklist,
            negative_earnings: &negative,
            excluded,
        };
        let earning_filter = apply_filters(
            union_for(&hits, TargetList::EarningFilter),
            MOMENTUM_FILTERS,
            &snapshots,
            &ctx,
            trace,
        );
        info!("Momentum result: {} symbols", earning_filter.kept.len());

        Ok(MomentumReport {
            as_of,
            universe_size: universe.len(),
            hits,
            earning_filter,
            skipped: snapshots.skipped,
            trace: trace.lines(),
        })
    }

    fn evaluate_all(
        &self,
        strategies: &[StrategyDef],
        snapshots: &SnapshotSet,
        release: &BTreeSet<String>,
        as_of: NaiveDate,
        trace: &TraceLog,
    ) -> Vec<StrategyHits> {
        let ctx = EvalContext {
            thresholds: self.thresholds,
            as_of,
        };

        strategies
            .iter()
            .map(|def| {
                let mut symbols = Vec::new();
                for (symbol, snapshot) in &snapshots.snapshots {
                    if def.universe == Universe::ReleaseList && !release.contains(symbol) {
                        continue;
                    }
                    let verdict = evaluate(def, snapshot, &ctx);
                    trace.note(symbol, || {
                        format!(
                            "{}: {} ({})",
                            def.name,
                            if verdict.passed { "pass" } else { "fail" },
                            verdict.detail
                        )
                    });
                    if verdict.passed {
                        symbols.push(symbol.clone());
                    }
                }
                debug!("{} matched {} symbols", def.name, symbols.len());
                StrategyHits {
                    strategy: def.name,
                    list: def.list,
                    symbols,
                }
            })
            .collect()
    }
}

fn union_for(hits: &[StrategyHits], list: TargetList) -> Vec<String> {
    hits.iter()
        .filter(|h| h.list == list)
        .flat_map(|h| h.symbols.iter().cloned())
        .collect()
}
