//! Filter state (granularity + period) and period-window filtering.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::PanelError;
use crate::normalize::record::EventRecord;

/// Time-bucket resolution for series aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    #[default]
    Day,
    Month,
    Year,
}

impl Granularity {
    pub const ALL: [Self; 4] = [Self::Hour, Self::Day, Self::Month, Self::Year];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PanelError::InvalidConfig {
                details: format!("unknown granularity {s:?} (expected hour|day|month|year)"),
            })
    }
}

/// Period preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Period {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "custom")]
    Custom,
}

impl Period {
    pub const ALL: [Self; 5] = [
        Self::All,
        Self::Last7Days,
        Self::Last30Days,
        Self::Last90Days,
        Self::Custom,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::Last90Days => "90d",
            Self::Custom => "custom",
        }
    }

    /// Trailing window length for the rolling presets.
    #[must_use]
    pub const fn trailing_days(self) -> Option<i64> {
        match self {
            Self::Last7Days => Some(7),
            Self::Last30Days => Some(30),
            Self::Last90Days => Some(90),
            Self::All | Self::Custom => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PanelError::InvalidConfig {
                details: format!("unknown period {s:?} (expected all|7d|30d|90d|custom)"),
            })
    }
}

/// User-selected view filters. Custom bounds are `YYYY-MM-DD` strings and are
/// only consulted when `period` is [`Period::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FilterState {
    pub granularity: Granularity,
    pub period: Period,
    pub custom_start: String,
    pub custom_end: String,
}

/// Absolute time window; an absent bound is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeriodWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl PeriodWindow {
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Inclusive on both ends.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| ts >= start) && self.end.is_none_or(|end| ts <= end)
    }
}

/// Resolve the period enum into absolute bounds.
///
/// Custom bounds are local start-of-day / end-of-day at `offset`; a bound that
/// is empty or does not parse stays open.
#[must_use]
pub fn resolve_period(filter: &FilterState, now: DateTime<Utc>, offset: FixedOffset) -> PeriodWindow {
    if let Some(days) = filter.period.trailing_days() {
        return PeriodWindow {
            start: Some(now - Duration::days(days)),
            end: Some(now),
        };
    }
    match filter.period {
        Period::Custom => PeriodWindow {
            start: parse_day(&filter.custom_start).and_then(|d| local_instant(d, 0, 0, 0, 0, offset)),
            end: parse_day(&filter.custom_end)
                .and_then(|d| local_instant(d, 23, 59, 59, 999_999_999, offset)),
        },
        _ => PeriodWindow::default(),
    }
}

/// Keep records whose timestamp falls inside the resolved window.
#[must_use]
pub fn apply_period_filter<'a, I>(
    records: I,
    filter: &FilterState,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<&'a EventRecord>
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let window = resolve_period(filter, now, offset);
    records
        .into_iter()
        .filter(|record| window.contains(record.timestamp))
        .collect()
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn local_instant(
    day: NaiveDate,
    hour: u32,
    minute: u32,
    second: u32,
    nano: u32,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let naive = day.and_hms_nano_opt(hour, minute, second, nano)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
