//! Test database utilities using the real DatabaseManager on a temp file

use anyhow::Result;
use chrono::NaiveDate;
use tempfile::TempDir;

use earnings_screener::database::DatabaseManager;
use earnings_screener::models::{EarningsRecord, PriceBar, StockInfo};

/// A fresh database that lives as long as its temp directory
pub struct TestDatabase {
    pub db: DatabaseManager,
    pub dir: TempDir,
}

/// Initialize a completely fresh test database
pub async fn init_fresh_test_database() -> Result<TestDatabase> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("screener.db");
    let db = DatabaseManager::new(&path.to_string_lossy()).await?;
    Ok(TestDatabase { db, dir })
}

/// Everything a screen needs for one symbol
pub struct SymbolSeed {
    pub symbol: &'static str,
    pub sector: Option<&'static str>,
    pub pe_ratio: &'static str,
    pub market_cap: f64,
    /// `(date, close on that date, reaction %)`
    pub earnings: Vec<(NaiveDate, f64, f64)>,
    /// Additional bars, e.g. the latest close
    pub bars: Vec<(NaiveDate, f64, i64)>,
}

impl SymbolSeed {
    pub fn new(symbol: &'static str) -> Self {
        Self {
            symbol,
            sector: Some("Technology"),
            pe_ratio: "25.0",
            market_cap: 50_000_000_000.0,
            earnings: Vec::new(),
            bars: Vec::new(),
        }
    }

    pub fn earnings(mut self, date: NaiveDate, close: f64, change_pct: f64) -> Self {
        self.earnings.push((date, close, change_pct));
        self
    }

    pub fn bar(mut self, date: NaiveDate, close: f64, volume: i64) -> Self {
        self.bars.push((date, close, volume));
        self
    }

    pub fn pe(mut self, pe_ratio: &'static str) -> Self {
        self.pe_ratio = pe_ratio;
        self
    }

    pub fn sector(mut self, sector: Option<&'static str>) -> Self {
        self.sector = sector;
        self
    }

    pub async fn insert(self, db: &DatabaseManager) -> Result<()> {
        db.upsert_stock(&StockInfo {
            symbol: self.symbol.to_string(),
            sector: self.sector.map(str::to_string),
            pe_ratio: Some(self.pe_ratio.to_string()),
            market_cap: Some(self.market_cap),
        })
        .await?;

        let mut bars: Vec<PriceBar> = self
            .earnings
            .iter()
            .map(|(date, close, _)| PriceBar {
                symbol: self.symbol.to_string(),
                date: *date,
                close: *close,
                volume: Some(2_000_000),
            })
            .collect();
        bars.extend(self.bars.iter().map(|(date, close, volume)| PriceBar {
            symbol: self.symbol.to_string(),
            date: *date,
            close: *close,
            volume: Some(*volume),
        }));
        db.upsert_price_bars(&bars).await?;

        let records: Vec<EarningsRecord> = self
            .earnings
            .iter()
            .map(|(date, _, change)| EarningsRecord {
                symbol: self.symbol.to_string(),
                date: *date,
                change_pct: Some(*change),
            })
            .collect();
        db.upsert_earnings(&records).await?;
        Ok(())
    }
}
