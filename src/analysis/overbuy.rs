//! Overbuy screen.
//!
//! Flags symbols that ran up hard since their last earnings date and checks
//! whether the run has started to roll over (double top or a fresh single peak).

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::analysis::patterns::{detect_double_top, is_single_peak, DoubleTop};
use crate::analysis::trace::TraceLog;
use crate::database::MarketDataSource;
use crate::models::Thresholds;
use crate::utils::percent_change;
use crate::watchlist::TagIndex;

const SCREEN_CONCURRENCY: usize = 8;

/// Tag-based symbol filter. A non-empty whitelist wins over the blacklist.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl TagFilter {
    pub fn allows(&self, tags: &[String]) -> bool {
        if !self.whitelist.is_empty() {
            return tags.iter().any(|t| self.whitelist.contains(t));
        }
        !tags.iter().any(|t| self.blacklist.contains(t))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverbuySignal {
    /// Double top just completed
    ShortShift(DoubleTop),
    /// Monthly high printed on the previous trading day
    Short,
    /// Large gain but no reversal pattern yet
    Candidate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverbuyRow {
    pub symbol: String,
    pub sector: String,
    pub earnings_date: NaiveDate,
    pub gain_pct: f64,
    pub tags: Vec<String>,
    pub signal: OverbuySignal,
}

impl OverbuyRow {
    pub fn render(&self) -> String {
        let tags = if self.tags.is_empty() {
            "no tags".to_string()
        } else {
            self.tags.join(", ")
        };
        format!("{:<20} {:<5} {:.2}%: {}", self.sector, self.symbol, self.gain_pct, tags)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverbuyReport {
    pub rows: Vec<OverbuyRow>,
}

impl OverbuyReport {
    /// Rows grouped by sector, each group sorted by gain descending
    pub fn by_sector(&self) -> BTreeMap<&str, Vec<&OverbuyRow>> {
        let mut groups: BTreeMap<&str, Vec<&OverbuyRow>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(row.sector.as_str()).or_default().push(row);
        }
        for rows in groups.values_mut() {
            rows.sort_by(|a, b| b.gain_pct.total_cmp(&a.gain_pct));
        }
        groups
    }

    pub fn lines(&self) -> Vec<String> {
        self.by_sector()
            .values()
            .flat_map(|rows| rows.iter().map(|r| r.render()))
            .collect()
    }

    pub fn short(&self) -> Vec<String> {
        self.symbols_where(|s| matches!(s, OverbuySignal::Short))
    }

    pub fn short_shift(&self) -> Vec<String> {
        self.symbols_where(|s| matches!(s, OverbuySignal::ShortShift(_)))
    }

    fn symbols_where(&self, pred: impl Fn(&OverbuySignal) -> bool) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .rows
            .iter()
            .filter(|r| pred(&r.signal))
            .map(|r| r.symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }
}

pub struct OverbuyScreen<'a, S: MarketDataSource> {
    source: &'a S,
    thresholds: &'a Thresholds,
}

impl<'a, S: MarketDataSource> OverbuyScreen<'a, S> {
    pub fn new(source: &'a S, thresholds: &'a Thresholds) -> Self {
        Self { source, thresholds }
    }

    pub async fn run(
        &self,
        symbols: &[String],
        as_of: NaiveDate,
        tags: &TagIndex,
        filter: &TagFilter,
        trace: &TraceLog,
    ) -> Result<OverbuyReport> {
        let allowed: Vec<&String> = symbols
            .iter()
            .filter(|symbol| {
                let ok = filter.allows(tags.tags_for(symbol));
                if !ok {
                    trace.note(symbol, || "excluded by tag filter".to_string());
                }
                ok
            })
            .collect();
        info!(
            "Overbuy screen over {} symbols ({} after tag filter) as of {}",
            symbols.len(),
            allowed.len(),
            as_of
        );

        let results: Vec<Result<Option<OverbuyRow>>> = stream::iter(allowed)
            .map(|symbol| async move { self.check(symbol, as_of, tags, trace).await })
            .buffer_unordered(SCREEN_CONCURRENCY)
            .collect()
            .await;

        let mut report = OverbuyReport::default();
        for result in results {
            if let Some(row) = result? {
                report.rows.push(row);
            }
        }
        report.rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        info!(
            "Overbuy: {} candidates, {} short, {} short shift",
            report.rows.len(),
            report.short().len(),
            report.short_shift().len()
        );
        Ok(report)
    }

    async fn check(&self, symbol: &str, as_of: NaiveDate, tags: &TagIndex, trace: &TraceLog) -> Result<Option<OverbuyRow>> {
        let t = self.thresholds;

        let Some(record) = self.source.recent_earnings(symbol, 1, as_of).await?.into_iter().next() else {
            trace.note(symbol, || "no earnings record".to_string());
            return Ok(None);
        };
        if record.change_pct.is_none() {
            trace.note(symbol, || format!("earnings {} has no recorded reaction", record.date));
            return Ok(None);
        }

        let Some(earnings_close) = self.source.close_on(symbol, record.date).await? else {
            trace.note(symbol, || format!("no close on earnings date {}", record.date));
            return Ok(None);
        };
        let Some(latest) = self.source.latest_bar(symbol, as_of).await? else {
            trace.note(symbol, || "no latest bar".to_string());
            return Ok(None);
        };
        let Some(gain_pct) = percent_change(earnings_close, latest.close) else {
            trace.note(symbol, || "earnings close is zero".to_string());
            return Ok(None);
        };
        trace.note(symbol, || {
            format!(
                "gain since {}: {:.2} -> {:.2} = {:.2}%",
                record.date, earnings_close, latest.close, gain_pct
            )
        });
        if gain_pct < t.overbuy_min_gain_pct {
            return Ok(None);
        }

        let bars = self.source.recent_bars(symbol, t.double_top_lookback, as_of).await?;
        let signal = if let Some(top) = detect_double_top(&bars, t) {
            debug!(
                "{} double top: {:.2} ({}) / {:.2} ({}), diff {:.2}%, depth {:.2}%",
                symbol,
                top.left_close,
                top.left_date,
                top.right_close,
                top.right_date,
                top.diff_pct * 100.0,
                top.depth_pct * 100.0
            );
            OverbuySignal::ShortShift(top)
        } else {
            let window_start = latest.date - Duration::days(t.single_peak_days);
            let window = self.source.bars_between(symbol, window_start, latest.date).await?;
            if is_single_peak(&window, t.single_peak_days) {
                OverbuySignal::Short
            } else {
                OverbuySignal::Candidate
            }
        };
        trace.note(symbol, || format!("signal: {:?}", signal));

        let sector = self
            .source
            .get_stock(symbol)
            .await?
            .and_then(|s| s.sector)
            .unwrap_or_else(|| "Unknown".to_string());

        Ok(Some(OverbuyRow {
            symbol: symbol.to_string(),
            sector,
            earnings_date: record.date,
            gain_pct,
            tags: tags.tags_for(symbol).to_vec(),
            signal,
        }))
    }
}
