use chrono::NaiveDate;
use thiserror::Error;

/// Errors callers may want to match on. Everything else travels as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum ScreenerError {
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("threshold profile version {found} is not supported (expected {expected})")]
    UnsupportedProfileVersion { found: u32, expected: u32 },

    #[error("invalid threshold '{field}': {reason}")]
    InvalidThreshold { field: &'static str, reason: String },

    #[error("{file}: line {line}: {reason}")]
    InvalidRow {
        file: String,
        line: u64,
        reason: String,
    },

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("as-of date {as_of} is after today ({today})")]
    FutureAsOf { as_of: NaiveDate, today: NaiveDate },
}
