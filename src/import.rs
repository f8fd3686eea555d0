use anyhow::Result;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::database::DatabaseManager;
use crate::error::ScreenerError;
use crate::models::{EarningsRecord, PriceBar, StockInfo};
use crate::utils::parse_date;
use crate::watchlist::load_sector_map;

#[derive(Debug, Deserialize)]
struct PriceRow {
    symbol: String,
    date: String,
    close: Option<String>,
    volume: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EarningsRow {
    symbol: String,
    date: String,
    change_pct: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockRow {
    symbol: String,
    sector: Option<String>,
    pe_ratio: Option<String>,
    market_cap: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportStats {
    pub rows_read: usize,
    pub rows_written: usize,
}

/// Parse optional string field to f64
fn parse_optional_f64(value: &Option<String>) -> Option<f64> {
    value.as_ref().and_then(|s| {
        if s.trim().is_empty() {
            None
        } else {
            s.trim().parse().ok()
        }
    })
}

/// Parse optional string field to i64; volumes sometimes arrive as "1234.0"
fn parse_optional_i64(value: &Option<String>) -> Option<i64> {
    value.as_ref().and_then(|s| {
        let s = s.trim();
        if s.is_empty() {
            None
        } else {
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|v| v as i64))
        }
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Read every row of a headed CSV file, tagging each with its line number
fn read_rows<T>(path: &Path) -> Result<Vec<(u64, T)>>
where
    T: for<'de> Deserialize<'de>,
{
    let file = path.display().to_string();
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: T = record.deserialize(Some(&headers)).map_err(|e| ScreenerError::InvalidRow {
            file: file.clone(),
            line,
            reason: e.to_string(),
        })?;
        rows.push((line, row));
    }
    Ok(rows)
}

fn row_date(file: &Path, line: u64, raw: &str) -> Result<chrono::NaiveDate, ScreenerError> {
    parse_date(raw).map_err(|e| ScreenerError::InvalidRow {
        file: file.display().to_string(),
        line,
        reason: e.to_string(),
    })
}

/// Import `symbol,date,close,volume`
pub async fn import_prices(db: &DatabaseManager, path: &Path) -> Result<ImportStats> {
    let rows: Vec<(u64, PriceRow)> = read_rows(path)?;
    let mut bars = Vec::with_capacity(rows.len());
    for (line, row) in &rows {
        let date = row_date(path, *line, &row.date)?;
        let close = parse_optional_f64(&row.close).ok_or_else(|| ScreenerError::InvalidRow {
            file: path.display().to_string(),
            line: *line,
            reason: format!("missing or invalid close {:?}", row.close),
        })?;
        bars.push(PriceBar {
            symbol: row.symbol.trim().to_uppercase(),
            date,
            close,
            volume: parse_optional_i64(&row.volume),
        });
    }

    let written = db.upsert_price_bars(&bars).await?;
    info!("Imported {} price bars from {}", written, path.display());
    Ok(ImportStats {
        rows_read: rows.len(),
        rows_written: written,
    })
}

/// Import `symbol,date,change_pct`
pub async fn import_earnings(db: &DatabaseManager, path: &Path) -> Result<ImportStats> {
    let rows: Vec<(u64, EarningsRow)> = read_rows(path)?;
    let mut records = Vec::with_capacity(rows.len());
    for (line, row) in &rows {
        records.push(EarningsRecord {
            symbol: row.symbol.trim().to_uppercase(),
            date: row_date(path, *line, &row.date)?,
            change_pct: parse_optional_f64(&row.change_pct),
        });
    }

    let written = db.upsert_earnings(&records).await?;
    info!("Imported {} earnings records from {}", written, path.display());
    Ok(ImportStats {
        rows_read: rows.len(),
        rows_written: written,
    })
}

/// Import `symbol,sector,pe_ratio,market_cap`. P/E stays text so "--" markers survive.
pub async fn import_stocks(db: &DatabaseManager, path: &Path) -> Result<ImportStats> {
    let rows: Vec<(u64, StockRow)> = read_rows(path)?;
    let stocks: Vec<StockInfo> = rows
        .iter()
        .map(|(_, row)| StockInfo {
            symbol: row.symbol.trim().to_uppercase(),
            sector: non_empty(row.sector.clone()),
            pe_ratio: row.pe_ratio.clone(),
            market_cap: parse_optional_f64(&row.market_cap),
        })
        .collect();

    let written = db.upsert_stocks(&stocks).await?;
    info!("Imported {} stocks from {}", written, path.display());
    Ok(ImportStats {
        rows_read: rows.len(),
        rows_written: written,
    })
}

/// Assign sectors from a `{sector: [symbols]}` JSON file
pub async fn import_sectors(db: &DatabaseManager, path: &Path) -> Result<ImportStats> {
    let map = load_sector_map(path)?;
    let mut assignments: Vec<(String, String)> = map.into_iter().collect();
    assignments.sort();
    let written = db.set_sectors(&assignments).await?;
    info!("Assigned sectors to {} symbols from {}", written, path.display());
    Ok(ImportStats {
        rows_read: assignments.len(),
        rows_written: written,
    })
}
