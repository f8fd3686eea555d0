use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ScreenerError;

pub const PROFILE_VERSION: u32 = 1;

/// Screening thresholds. Missing fields in a profile fall back to these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    // Earnings-season comparisons
    pub num_earnings: usize,
    pub min_drop_pct: f64,
    pub rise_drop_pct: f64,
    pub high_margin_pct: f64,
    pub deep_lookback: usize,
    pub min_gap_days: i64,

    // Pre-earnings window, relative to the estimated next report
    pub next_earnings_months: u32,
    pub pre_window_start_days: i64,
    pub pre_window_end_days: i64,

    // Post-earnings fade
    pub fade_window_start_days: i64,
    pub fade_window_end_days: i64,
    pub peak_radius_days: i64,
    pub recent_earnings_days: i64,

    // Liquidity and size
    pub large_cap_threshold: f64,
    pub min_turnover: f64,

    // Momentum screen universe
    pub momentum_sectors: Vec<String>,

    // Overbuy screen
    pub overbuy_min_gain_pct: f64,
    pub double_top_max_diff: f64,
    pub double_top_min_depth: f64,
    pub double_top_lookback: usize,
    pub double_top_min_bars: usize,
    pub single_peak_days: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            num_earnings: 2,
            min_drop_pct: 0.04,
            rise_drop_pct: 0.07,
            high_margin_pct: 0.07,
            deep_lookback: 4,
            min_gap_days: 7,
            next_earnings_months: 3,
            pre_window_start_days: 20,
            pre_window_end_days: 7,
            fade_window_start_days: 5,
            fade_window_end_days: 11,
            peak_radius_days: 2,
            recent_earnings_days: 30,
            large_cap_threshold: 100_000_000_000.0, // $100B
            min_turnover: 100_000_000.0,            // $100M
            momentum_sectors: [
                "Basic_Materials",
                "Communication_Services",
                "Consumer_Cyclical",
                "Consumer_Defensive",
                "Energy",
                "Financial_Services",
                "Healthcare",
                "Industrials",
                "Real_Estate",
                "Technology",
                "Utilities",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            overbuy_min_gain_pct: 30.0,
            double_top_max_diff: 0.038,
            double_top_min_depth: 0.025,
            double_top_lookback: 60,
            double_top_min_bars: 10,
            single_peak_days: 30,
        }
    }
}

impl Thresholds {
    /// Drop percentage for size-dependent rules: large caps move less.
    pub fn drop_for_market_cap(&self, market_cap: Option<f64>) -> f64 {
        match market_cap {
            Some(cap) if cap >= self.large_cap_threshold => self.min_drop_pct,
            _ => self.rise_drop_pct,
        }
    }

    /// Number of earnings dates a snapshot must carry
    pub fn earnings_lookback(&self) -> usize {
        self.num_earnings.max(self.deep_lookback)
    }

    pub fn validate(&self) -> Result<(), ScreenerError> {
        let fractions = [
            ("min_drop_pct", self.min_drop_pct),
            ("rise_drop_pct", self.rise_drop_pct),
            ("high_margin_pct", self.high_margin_pct),
            ("double_top_max_diff", self.double_top_max_diff),
            ("double_top_min_depth", self.double_top_min_depth),
        ];
        for (field, value) in fractions {
            if !(0.0..1.0).contains(&value) {
                return Err(ScreenerError::InvalidThreshold {
                    field,
                    reason: format!("{} is outside [0, 1)", value),
                });
            }
        }

        if self.num_earnings < 2 {
            return Err(ScreenerError::InvalidThreshold {
                field: "num_earnings",
                reason: "at least two earnings dates are needed to compare".to_string(),
            });
        }
        if self.deep_lookback < 2 {
            return Err(ScreenerError::InvalidThreshold {
                field: "deep_lookback",
                reason: "must be at least 2".to_string(),
            });
        }
        if self.pre_window_start_days < self.pre_window_end_days {
            return Err(ScreenerError::InvalidThreshold {
                field: "pre_window_start_days",
                reason: format!(
                    "window start ({} days before) must not be later than its end ({} days before)",
                    self.pre_window_start_days, self.pre_window_end_days
                ),
            });
        }
        if self.fade_window_start_days > self.fade_window_end_days {
            return Err(ScreenerError::InvalidThreshold {
                field: "fade_window_start_days",
                reason: "window start is after window end".to_string(),
            });
        }
        if self.double_top_min_bars < 4 || self.double_top_lookback < self.double_top_min_bars {
            return Err(ScreenerError::InvalidThreshold {
                field: "double_top_min_bars",
                reason: "need at least 4 bars and a lookback covering them".to_string(),
            });
        }
        if self.min_turnover < 0.0 || self.large_cap_threshold < 0.0 {
            return Err(ScreenerError::InvalidThreshold {
                field: "min_turnover",
                reason: "money thresholds must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Versioned on-disk threshold profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdProfile {
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub thresholds: Thresholds,
}

impl ThresholdProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading threshold profile {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("loading threshold profile {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let profile: ThresholdProfile = serde_json::from_str(raw)?;
        if profile.version != PROFILE_VERSION {
            return Err(ScreenerError::UnsupportedProfileVersion {
                found: profile.version,
                expected: PROFILE_VERSION,
            }
            .into());
        }
        profile.thresholds.validate()?;
        Ok(profile)
    }

    pub fn into_thresholds(self) -> Thresholds {
        self.thresholds
    }
}
