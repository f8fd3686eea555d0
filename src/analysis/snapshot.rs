//! Per-symbol snapshot of everything the strategies read.
//!
//! A snapshot is loaded once per run and bounded by the run's as-of date, so
//! strategies stay pure functions over in-memory data.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, info_span, Instrument};

use crate::analysis::trace::TraceLog;
use crate::database::MarketDataSource;
use crate::models::{EarningsPoint, PriceBar, Thresholds};

const LOAD_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub sector: Option<String>,
    /// Newest first
    pub earnings: Vec<EarningsPoint>,
    pub latest_earnings_change: Option<f64>,
    pub latest: PriceBar,
    pub pe_ratio: Option<String>,
    pub market_cap: Option<f64>,
    /// Highest close within the peak radius around the latest earnings date
    pub peak_close_near_earnings: Option<f64>,
}

impl SymbolSnapshot {
    pub fn latest_earnings_date(&self) -> NaiveDate {
        // load() refuses snapshots without earnings
        self.earnings.first().map(|e| e.date).unwrap_or(self.latest.date)
    }

    /// Closes of the `n` most recent earnings dates, newest first.
    /// `None` when fewer than `n` dates are known or any close is missing.
    pub fn earnings_closes(&self, n: usize) -> Option<Vec<f64>> {
        if self.earnings.len() < n {
            return None;
        }
        self.earnings[..n].iter().map(|e| e.close).collect()
    }

    /// True when the last `n` earnings closes rise strictly, oldest to newest
    pub fn is_rising(&self, n: usize) -> bool {
        match self.earnings_closes(n) {
            Some(closes) => closes.windows(2).all(|w| w[1] < w[0]),
            None => false,
        }
    }

    pub fn days_since_earnings(&self) -> i64 {
        (self.latest.date - self.latest_earnings_date()).num_days()
    }

    pub fn turnover(&self) -> Option<f64> {
        self.latest.turnover()
    }

    pub fn has_valid_pe(&self) -> bool {
        crate::models::is_valid_pe(self.pe_ratio.as_deref())
    }
}

/// Why a symbol could not be snapshotted
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotEnoughEarnings { found: usize, required: usize },
    MissingEarningsClose(NaiveDate),
    NoLatestBar,
    NoLatestVolume,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotEnoughEarnings { found, required } => {
                write!(f, "only {} earnings records, {} required", found, required)
            }
            SkipReason::MissingEarningsClose(date) => write!(f, "no close on earnings date {}", date),
            SkipReason::NoLatestBar => write!(f, "no price bar on or before the as-of date"),
            SkipReason::NoLatestVolume => write!(f, "latest bar has no volume"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    Loaded(Box<SymbolSnapshot>),
    Skipped(SkipReason),
}

/// Snapshots for a run plus what was skipped
#[derive(Debug, Default)]
pub struct SnapshotSet {
    pub snapshots: BTreeMap<String, SymbolSnapshot>,
    pub skipped: BTreeMap<String, SkipReason>,
}

impl SnapshotSet {
    pub fn get(&self, symbol: &str) -> Option<&SymbolSnapshot> {
        self.snapshots.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

pub struct SnapshotLoader<'a, S: MarketDataSource> {
    source: &'a S,
    thresholds: &'a Thresholds,
}

impl<'a, S: MarketDataSource> SnapshotLoader<'a, S> {
    pub fn new(source: &'a S, thresholds: &'a Thresholds) -> Self {
        Self { source, thresholds }
    }

    pub async fn load(&self, symbol: &str, as_of: NaiveDate, trace: &TraceLog) -> Result<SnapshotOutcome> {
        let t = self.thresholds;

        let records = self
            .source
            .recent_earnings(symbol, t.earnings_lookback(), as_of)
            .await?;
        trace.note(symbol, || {
            format!(
                "earnings dates: {:?}",
                records.iter().map(|r| r.date.to_string()).collect::<Vec<_>>()
            )
        });
        if records.len() < t.num_earnings {
            return Ok(SnapshotOutcome::Skipped(SkipReason::NotEnoughEarnings {
                found: records.len(),
                required: t.num_earnings,
            }));
        }

        let mut earnings = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let close = self.source.close_on(symbol, record.date).await?;
            if close.is_none() && i < t.num_earnings {
                trace.note(symbol, || format!("missing close on earnings date {}", record.date));
                return Ok(SnapshotOutcome::Skipped(SkipReason::MissingEarningsClose(record.date)));
            }
            earnings.push(EarningsPoint {
                date: record.date,
                close,
            });
        }
        trace.note(symbol, || {
            format!(
                "earnings closes: {:?}",
                earnings.iter().map(|e| e.close).collect::<Vec<_>>()
            )
        });

        let latest = match self.source.latest_bar(symbol, as_of).await? {
            Some(bar) => bar,
            None => return Ok(SnapshotOutcome::Skipped(SkipReason::NoLatestBar)),
        };
        if latest.volume.is_none() {
            return Ok(SnapshotOutcome::Skipped(SkipReason::NoLatestVolume));
        }
        trace.note(symbol, || {
            format!(
                "latest bar: {} close {} volume {:?}",
                latest.date, latest.close, latest.volume
            )
        });

        let stock = self.source.get_stock(symbol).await?.unwrap_or_default();
        trace.note(symbol, || {
            format!(
                "fundamentals: sector {:?}, P/E {:?}, market cap {:?}",
                stock.sector, stock.pe_ratio, stock.market_cap
            )
        });

        let latest_er = records[0].date;
        let radius = Duration::days(t.peak_radius_days);
        let peak_close_near_earnings = self
            .source
            .max_close_between(symbol, latest_er - radius, (latest_er + radius).min(as_of))
            .await?;

        Ok(SnapshotOutcome::Loaded(Box::new(SymbolSnapshot {
            symbol: symbol.to_string(),
            sector: stock.sector,
            earnings,
            latest_earnings_change: records[0].change_pct,
            latest,
            pe_ratio: stock.pe_ratio,
            market_cap: stock.market_cap,
            peak_close_near_earnings,
        })))
    }

    /// Load snapshots for a symbol list; duplicates are loaded once
    pub async fn load_many(&self, symbols: &[String], as_of: NaiveDate, trace: &TraceLog) -> Result<SnapshotSet> {
        let mut unique: Vec<&String> = symbols.iter().collect();
        unique.sort();
        unique.dedup();

        info!("Building snapshots for {} symbols as of {}", unique.len(), as_of);

        let results: Vec<(String, Result<SnapshotOutcome>)> = stream::iter(unique)
            .map(|symbol| async move {
                let span = info_span!("symbol", %symbol);
                (symbol.clone(), self.load(symbol, as_of, trace).instrument(span).await)
            })
            .buffer_unordered(LOAD_CONCURRENCY)
            .collect()
            .await;

        let mut set = SnapshotSet::default();
        for (symbol, result) in results {
            match result? {
                SnapshotOutcome::Loaded(snapshot) => {
                    trace.note(&symbol, || "snapshot loaded".to_string());
                    set.snapshots.insert(symbol, *snapshot);
                }
                SnapshotOutcome::Skipped(reason) => {
                    debug!("Skipping {}: {}", symbol, reason);
                    trace.note(&symbol, || format!("skipped: {}", reason));
                    set.skipped.insert(symbol, reason);
                }
            }
        }

        info!(
            "Snapshots ready: {} loaded, {} skipped",
            set.snapshots.len(),
            set.skipped.len()
        );
        Ok(set)
    }
}
