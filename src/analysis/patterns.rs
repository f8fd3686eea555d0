//! Chart pattern detection over daily closes.
//!
//! Both detectors take bars oldest first and only look at what they are given,
//! so callers bound the slice by the run's as-of date.

use chrono::{Duration, NaiveDate};

use crate::models::{PriceBar, Thresholds};

/// A double top whose right peak is the previous trading day
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleTop {
    pub left_date: NaiveDate,
    pub left_close: f64,
    pub right_date: NaiveDate,
    pub right_close: f64,
    /// Relative height difference between the peaks
    pub diff_pct: f64,
    /// Valley depth below the average peak
    pub depth_pct: f64,
}

/// Detect a just-completed double top in `bars` (oldest first).
///
/// The right peak must be yesterday: higher than the day before and higher
/// than today. The left peak is the nearest local maximum at least three bars
/// earlier whose height is within `double_top_max_diff` of the right peak and
/// with a valley between them at least `double_top_min_depth` deep.
pub fn detect_double_top(bars: &[PriceBar], t: &Thresholds) -> Option<DoubleTop> {
    let start = bars.len().saturating_sub(t.double_top_lookback);
    let bars = &bars[start..];
    let n = bars.len();
    if n < t.double_top_min_bars || n < 5 {
        return None;
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let idx2 = n - 2;
    let p2 = closes[idx2];
    if !(p2 > closes[idx2 - 1] && p2 > closes[n - 1]) {
        return None;
    }

    for idx1 in (1..=idx2 - 3).rev() {
        let p1 = closes[idx1];
        if !(p1 > closes[idx1 - 1] && p1 > closes[idx1 + 1]) {
            continue;
        }

        let diff_pct = (p1 - p2).abs() / p1.max(p2);
        if diff_pct > t.double_top_max_diff {
            continue;
        }

        let min_valley = closes[idx1 + 1..idx2].iter().copied().fold(f64::MAX, f64::min);
        let avg_peak = (p1 + p2) / 2.0;
        let depth_pct = (avg_peak - min_valley) / avg_peak;
        if depth_pct < t.double_top_min_depth {
            continue;
        }

        return Some(DoubleTop {
            left_date: bars[idx1].date,
            left_close: p1,
            right_date: bars[idx2].date,
            right_close: p2,
            diff_pct,
            depth_pct,
        });
    }
    None
}

/// True when the highest close of the last `window_days` calendar days
/// (ties go to the later date) falls on the previous trading day.
pub fn is_single_peak(bars: &[PriceBar], window_days: i64) -> bool {
    let (latest, previous) = match bars {
        [.., previous, latest] => (latest, previous),
        _ => return false,
    };
    let window_start = latest.date - Duration::days(window_days);

    let peak = bars
        .iter()
        .filter(|b| b.date >= window_start && b.date <= latest.date)
        .fold(None::<&PriceBar>, |best, bar| match best {
            Some(b) if b.close > bar.close => Some(b),
            Some(b) if b.close == bar.close && b.date > bar.date => Some(b),
            _ => Some(bar),
        });

    peak.is_some_and(|p| p.date == previous.date)
}
