use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{DatabaseStats, EarningsRecord, PriceBar, StockInfo};

/// Read access the screens need. Every read is bounded by the caller's as-of date
/// so a run can be replayed against history.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn get_stock(&self, symbol: &str) -> Result<Option<StockInfo>>;

    /// Most recent earnings records on or before `as_of`, newest first
    async fn recent_earnings(&self, symbol: &str, limit: usize, as_of: NaiveDate) -> Result<Vec<EarningsRecord>>;

    async fn close_on(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>>;

    async fn latest_bar(&self, symbol: &str, as_of: NaiveDate) -> Result<Option<PriceBar>>;

    /// Last bar strictly before `before`
    async fn previous_bar(&self, symbol: &str, before: NaiveDate) -> Result<Option<PriceBar>>;

    /// Most recent bars on or before `as_of`, oldest first
    async fn recent_bars(&self, symbol: &str, limit: usize, as_of: NaiveDate) -> Result<Vec<PriceBar>>;

    /// Bars in `[start, end]`, oldest first
    async fn bars_between(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>>;

    async fn max_close_between(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Option<f64>>;

    /// Distinct symbols with at least one earnings record on or before `as_of`
    async fn earnings_symbols(&self, as_of: NaiveDate) -> Result<Vec<String>>;

    async fn symbols_in_sectors(&self, sectors: &[String]) -> Result<Vec<String>>;

    /// Symbols whose earnings reaction was negative on a date in `[since, as_of]`
    async fn negative_earnings_since(&self, since: NaiveDate, as_of: NaiveDate) -> Result<HashSet<String>>;
}

/// SQLX-based database manager for the screener store
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (creating if needed) the SQLite store and ensure the schema exists
    pub async fn new(database_path: &str) -> Result<Self> {
        let filename = database_path.strip_prefix("sqlite:").unwrap_or(database_path);

        let options = SqliteConnectOptions::new()
            .filename(filename)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.create_schema().await?;
        info!("Database ready at {}", filename);
        Ok(db)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stocks (
                symbol TEXT PRIMARY KEY,
                sector TEXT,
                pe_ratio TEXT,
                market_cap REAL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                date DATE NOT NULL,
                close_price REAL NOT NULL,
                volume INTEGER,
                UNIQUE(symbol, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS earnings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                date DATE NOT NULL,
                change_pct REAL,
                UNIQUE(symbol, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_daily_prices_symbol_date ON daily_prices(symbol, date)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_earnings_symbol_date ON earnings(symbol, date)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stocks_sector ON stocks(sector)")
            .execute(&self.pool)
            .await?;

        debug!("Schema verified");
        Ok(())
    }

    /// Insert or update a fundamentals row. A `None` sector keeps the stored one.
    pub async fn upsert_stock(&self, stock: &StockInfo) -> Result<()> {
        self.upsert_stocks(std::slice::from_ref(stock)).await?;
        Ok(())
    }

    /// Insert or update fundamentals rows in one transaction
    pub async fn upsert_stocks(&self, stocks: &[StockInfo]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for stock in stocks {
            sqlx::query(
                r#"
                INSERT INTO stocks (symbol, sector, pe_ratio, market_cap, updated_at)
                VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(symbol) DO UPDATE SET
                    sector = COALESCE(excluded.sector, stocks.sector),
                    pe_ratio = excluded.pe_ratio,
                    market_cap = excluded.market_cap,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(&stock.symbol)
            .bind(&stock.sector)
            .bind(&stock.pe_ratio)
            .bind(stock.market_cap)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(stocks.len())
    }

    /// Assign sectors in one transaction, creating bare rows for unknown symbols
    pub async fn set_sectors(&self, assignments: &[(String, String)]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for (symbol, sector) in assignments {
            sqlx::query(
                r#"
                INSERT INTO stocks (symbol, sector) VALUES (?, ?)
                ON CONFLICT(symbol) DO UPDATE SET sector = excluded.sector, updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(symbol)
            .bind(sector)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(assignments.len())
    }

    /// Insert or replace daily bars in one transaction
    pub async fn upsert_price_bars(&self, bars: &[PriceBar]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO daily_prices (symbol, date, close_price, volume)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(symbol, date) DO UPDATE SET
                    close_price = excluded.close_price,
                    volume = excluded.volume
                "#,
            )
            .bind(&bar.symbol)
            .bind(bar.date)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(bars.len())
    }

    /// Insert or replace earnings records in one transaction
    pub async fn upsert_earnings(&self, records: &[EarningsRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO earnings (symbol, date, change_pct)
                VALUES (?, ?, ?)
                ON CONFLICT(symbol, date) DO UPDATE SET change_pct = excluded.change_pct
                "#,
            )
            .bind(&record.symbol)
            .bind(record.date)
            .bind(record.change_pct)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    pub async fn all_symbols(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol FROM stocks
            UNION
            SELECT DISTINCT symbol FROM daily_prices
            ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("symbol")).collect())
    }

    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let total_symbols: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM (SELECT symbol FROM stocks UNION SELECT symbol FROM daily_prices)",
        )
        .fetch_one(&self.pool)
        .await?;
        let total_price_bars: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM daily_prices")
            .fetch_one(&self.pool)
            .await?;
        let total_earnings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM earnings")
            .fetch_one(&self.pool)
            .await?;
        let latest: Option<String> = sqlx::query_scalar("SELECT MAX(date) FROM daily_prices")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            total_symbols: total_symbols as usize,
            total_price_bars: total_price_bars as usize,
            total_earnings: total_earnings as usize,
            latest_price_date: latest.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        })
    }
}

fn price_bar_from_row(row: &SqliteRow) -> PriceBar {
    PriceBar {
        symbol: row.get::<String, _>("symbol"),
        date: row.get::<NaiveDate, _>("date"),
        close: row.get::<f64, _>("close_price"),
        volume: row.get::<Option<i64>, _>("volume"),
    }
}

#[async_trait]
impl MarketDataSource for DatabaseManager {
    async fn get_stock(&self, symbol: &str) -> Result<Option<StockInfo>> {
        let row = sqlx::query("SELECT symbol, sector, pe_ratio, market_cap FROM stocks WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| StockInfo {
            symbol: r.get::<String, _>("symbol"),
            sector: r.get::<Option<String>, _>("sector"),
            pe_ratio: r.get::<Option<String>, _>("pe_ratio"),
            market_cap: r.get::<Option<f64>, _>("market_cap"),
        }))
    }

    async fn recent_earnings(&self, symbol: &str, limit: usize, as_of: NaiveDate) -> Result<Vec<EarningsRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, date, change_pct
            FROM earnings
            WHERE symbol = ? AND date <= ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(as_of)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| EarningsRecord {
                symbol: r.get::<String, _>("symbol"),
                date: r.get::<NaiveDate, _>("date"),
                change_pct: r.get::<Option<f64>, _>("change_pct"),
            })
            .collect())
    }

    async fn close_on(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>> {
        let close: Option<f64> =
            sqlx::query_scalar("SELECT close_price FROM daily_prices WHERE symbol = ? AND date = ?")
                .bind(symbol)
                .bind(date)
                .fetch_optional(&self.pool)
                .await?;
        Ok(close)
    }

    async fn latest_bar(&self, symbol: &str, as_of: NaiveDate) -> Result<Option<PriceBar>> {
        let row = sqlx::query(
            r#"
            SELECT symbol, date, close_price, volume
            FROM daily_prices
            WHERE symbol = ? AND date <= ?
            ORDER BY date DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(price_bar_from_row))
    }

    async fn previous_bar(&self, symbol: &str, before: NaiveDate) -> Result<Option<PriceBar>> {
        let row = sqlx::query(
            r#"
            SELECT symbol, date, close_price, volume
            FROM daily_prices
            WHERE symbol = ? AND date < ?
            ORDER BY date DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(before)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(price_bar_from_row))
    }

    async fn recent_bars(&self, symbol: &str, limit: usize, as_of: NaiveDate) -> Result<Vec<PriceBar>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, date, close_price, volume
            FROM daily_prices
            WHERE symbol = ? AND date <= ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(as_of)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut bars: Vec<PriceBar> = rows.iter().map(price_bar_from_row).collect();
        bars.reverse();
        Ok(bars)
    }

    async fn bars_between(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, date, close_price, volume
            FROM daily_prices
            WHERE symbol = ? AND date BETWEEN ? AND ?
            ORDER BY date ASC
            "#,
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(price_bar_from_row).collect())
    }

    async fn max_close_between(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Option<f64>> {
        let max: Option<f64> = sqlx::query_scalar(
            "SELECT MAX(close_price) FROM daily_prices WHERE symbol = ? AND date BETWEEN ? AND ?",
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(max)
    }

    async fn earnings_symbols(&self, as_of: NaiveDate) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT symbol FROM earnings WHERE date <= ? ORDER BY symbol")
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("symbol")).collect())
    }

    async fn symbols_in_sectors(&self, sectors: &[String]) -> Result<Vec<String>> {
        if sectors.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; sectors.len()].join(", ");
        let sql = format!(
            "SELECT symbol FROM stocks WHERE sector IN ({}) ORDER BY symbol",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for sector in sectors {
            query = query.bind(sector);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("symbol")).collect())
    }

    async fn negative_earnings_since(&self, since: NaiveDate, as_of: NaiveDate) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT symbol FROM earnings WHERE date >= ? AND date <= ? AND change_pct < 0",
        )
        .bind(since)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("symbol")).collect())
    }
}
