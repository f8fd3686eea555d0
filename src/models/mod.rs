use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod thresholds;

pub use thresholds::{ThresholdProfile, Thresholds};

/// Fundamentals row for a symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockInfo {
    pub symbol: String,
    pub sector: Option<String>,
    /// Kept as text: the scraper writes "--" or "null" when Yahoo has no P/E.
    pub pe_ratio: Option<String>,
    pub market_cap: Option<f64>,
}

impl StockInfo {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    pub fn has_valid_pe(&self) -> bool {
        is_valid_pe(self.pe_ratio.as_deref())
    }
}

pub fn is_valid_pe(pe: Option<&str>) -> bool {
    match pe {
        None => false,
        Some(raw) => {
            let value = raw.trim().to_ascii_lowercase();
            !matches!(value.as_str(), "" | "--" | "null")
        }
    }
}

/// One daily close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
    pub volume: Option<i64>,
}

impl PriceBar {
    pub fn turnover(&self) -> Option<f64> {
        self.volume.map(|v| self.close * v as f64)
    }
}

/// An earnings release and the price reaction the scraper recorded for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub change_pct: Option<f64>,
}

/// An earnings date paired with the close on that date
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarningsPoint {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

/// Database statistics for the `stats` command
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseStats {
    pub total_symbols: usize,
    pub total_price_bars: usize,
    pub total_earnings: usize,
    pub latest_price_date: Option<NaiveDate>,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub panel_path: PathBuf,
    pub blacklist_path: PathBuf,
    pub tags_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub profile_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "finance.db".to_string(),
            panel_path: PathBuf::from("Sectors_panel.json"),
            blacklist_path: PathBuf::from("Blacklist.json"),
            tags_path: None,
            output_dir: PathBuf::from("news"),
            profile_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();
        Config {
            database_path: std::env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            panel_path: std::env::var("PANEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.panel_path),
            blacklist_path: std::env::var("BLACKLIST_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.blacklist_path),
            tags_path: std::env::var("TAGS_PATH").ok().map(PathBuf::from),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            profile_path: std::env::var("SCREENER_PROFILE").ok().map(PathBuf::from),
        }
    }
}
