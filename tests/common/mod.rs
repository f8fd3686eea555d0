//! Common test utilities and helpers

pub mod database;

pub use database::{init_fresh_test_database, SymbolSeed, TestDatabase};

/// Test data utilities
pub mod test_data {
    use chrono::{Duration, NaiveDate};
    use earnings_screener::models::{PriceBar, StockInfo};

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Create a test stock
    pub fn create_test_stock(symbol: &str, sector: &str) -> StockInfo {
        StockInfo {
            symbol: symbol.to_string(),
            sector: Some(sector.to_string()),
            pe_ratio: Some("25.0".to_string()),
            market_cap: Some(50_000_000_000.0),
        }
    }

    /// Consecutive daily bars starting at `start`
    pub fn create_bar_series(symbol: &str, start: NaiveDate, closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| PriceBar {
                symbol: symbol.to_string(),
                date: start + Duration::days(i as i64),
                close: *close,
                volume: Some(2_000_000),
            })
            .collect()
    }

    pub fn symbols(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }
}

/// Logging utilities for tests
pub mod logging {
    use std::sync::Once;
    use tracing::{debug, info};

    static INIT: Once = Once::new();

    /// Initialize test logging
    pub fn init_test_logging() {
        INIT.call_once(|| {
            // test-log may already have installed a subscriber
            let _ = tracing::subscriber::set_global_default(
                tracing_subscriber::fmt()
                    .with_env_filter("earnings_screener=debug,main=debug")
                    .with_test_writer()
                    .finish(),
            );
        });
    }

    /// Log test step
    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }

    /// Log test data
    pub fn log_test_data<T: std::fmt::Debug>(label: &str, data: &T) {
        debug!("📊 {}: {:?}", label, data);
    }
}
