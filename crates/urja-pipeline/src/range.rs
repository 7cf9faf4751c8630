//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Energy data pipeline routines for household consumption."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Symbolic time ranges and aggregation windows.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};

/// One of the five symbolic ranges accepted by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    #[default]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

struct RangeEntry {
    range: TimeRange,
    symbol: &'static str,
    points: usize,
    interval_secs: i64,
    default_granularity_secs: i64,
}

// Indexed by `TimeRange` discriminant.
static RANGE_TABLE: [RangeEntry; 5] = [
    RangeEntry {
        range: TimeRange::Hour,
        symbol: "1h",
        points: 60,
        interval_secs: 60,
        default_granularity_secs: 60,
    },
    RangeEntry {
        range: TimeRange::SixHours,
        symbol: "6h",
        points: 72,
        interval_secs: 5 * 60,
        default_granularity_secs: 5 * 60,
    },
    RangeEntry {
        range: TimeRange::Day,
        symbol: "24h",
        points: 96,
        interval_secs: 15 * 60,
        default_granularity_secs: 60 * 60,
    },
    RangeEntry {
        range: TimeRange::Week,
        symbol: "7d",
        points: 168,
        interval_secs: 60 * 60,
        default_granularity_secs: 6 * 60 * 60,
    },
    RangeEntry {
        range: TimeRange::Month,
        symbol: "30d",
        points: 720,
        interval_secs: 60 * 60,
        default_granularity_secs: 24 * 60 * 60,
    },
];

/// Sampling layout of a range: `points` batches spaced `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub points: usize,
    pub interval: Duration,
}

impl TimeRange {
    pub const ALL: [TimeRange; 5] = [
        TimeRange::Hour,
        TimeRange::SixHours,
        TimeRange::Day,
        TimeRange::Week,
        TimeRange::Month,
    ];

    fn entry(self) -> &'static RangeEntry {
        &RANGE_TABLE[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.entry().symbol
    }

    pub fn window(self) -> RangeWindow {
        let entry = self.entry();
        RangeWindow {
            points: entry.points,
            interval: Duration::seconds(entry.interval_secs),
        }
    }

    /// Total time covered by the series.
    pub fn span(self) -> Duration {
        let window = self.window();
        window.interval * window.points as i32
    }

    /// Aggregation window used for store queries when the caller names none.
    pub fn default_granularity(self) -> Granularity {
        Granularity::from_secs(self.entry().default_granularity_secs)
    }
}

impl FromStr for TimeRange {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        RANGE_TABLE
            .iter()
            .find(|entry| entry.symbol == trimmed)
            .map(|entry| entry.range)
            .ok_or_else(|| PipelineError::InvalidRange(value.to_owned()))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-width aggregation window such as `15m` or `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Granularity {
    secs: i64,
}

impl Granularity {
    fn from_secs(secs: i64) -> Self {
        Self { secs }
    }

    pub fn as_secs(self) -> i64 {
        self.secs
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(self.secs)
    }
}

impl FromStr for Granularity {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || PipelineError::InvalidGranularity(value.to_owned());
        let trimmed = value.trim();
        if trimmed.len() < 2 || !trimmed.is_ascii() {
            return Err(invalid());
        }
        let (amount, unit) = trimmed.split_at(trimmed.len() - 1);
        let amount: i64 = amount.parse().map_err(|_| invalid())?;
        if amount <= 0 {
            return Err(invalid());
        }
        let unit_secs = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            "d" => 24 * 60 * 60,
            _ => return Err(invalid()),
        };
        amount
            .checked_mul(unit_secs)
            .map(Self::from_secs)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(i64, &str); 3] = [(24 * 60 * 60, "d"), (60 * 60, "h"), (60, "m")];
        for (unit_secs, suffix) in UNITS {
            if self.secs % unit_secs == 0 {
                return write!(f, "{}{}", self.secs / unit_secs, suffix);
            }
        }
        write!(f, "{}s", self.secs)
    }
}
