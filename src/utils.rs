use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate};

use crate::error::ScreenerError;

/// Parse a `YYYY-MM-DD` date as used by the store and the CLI
pub fn parse_date(value: &str) -> Result<NaiveDate, ScreenerError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ScreenerError::InvalidDate(value.to_string()))
}

/// Resolve the `--as-of` flag. Replays may look back but never ahead of today.
pub fn resolve_as_of(value: Option<&str>) -> Result<NaiveDate> {
    let today = Local::now().date_naive();
    match value {
        None => Ok(today),
        Some(raw) => {
            let as_of = parse_date(raw)?;
            if as_of > today {
                return Err(ScreenerError::FutureAsOf { as_of, today }.into());
            }
            Ok(as_of)
        }
    }
}

/// Add calendar months, clamping the day to the end of the target month
/// (Jan 31 + 1 month = Feb 28/29).
pub fn add_months_clamped(date: NaiveDate, months: u32) -> NaiveDate {
    let total = date.month0() + months;
    let year = date.year() + (total / 12) as i32;
    let month = total % 12 + 1;
    let day = date.day().min(days_in_month(year, month));
    // year/month/day are all in range by construction
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Percent change from `base` to `value`, `None` when the base is zero
pub fn percent_change(base: f64, value: f64) -> Option<f64> {
    if base == 0.0 {
        return None;
    }
    Some((value - base) / base * 100.0)
}
