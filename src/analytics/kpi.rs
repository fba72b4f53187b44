//! Scalar metrics: sessions, returning rate, summaries, latest activity.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Serialize, Serializer};

use crate::analytics::categorical::normalize_referrer;
use crate::dataset::index::Dataset;
use crate::normalize::record::{DeviceType, EventRecord};

/// Placeholder for empty display cells.
pub const EMPTY_CELL: &str = "--";

/// Distinct non-empty session ids.
#[must_use]
pub fn unique_sessions<'a, I>(records: I) -> usize
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    records
        .into_iter()
        .filter(|r| !r.session_id.is_empty())
        .map(|r| r.session_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Sessions that appear in exactly one record.
#[must_use]
pub fn single_visit_sessions<'a, I>(records: I) -> usize
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut per_session: HashMap<&str, u32> = HashMap::new();
    for record in records {
        if !record.session_id.is_empty() {
            *per_session.entry(record.session_id.as_str()).or_insert(0) += 1;
        }
    }
    per_session.values().filter(|&&n| n == 1).count()
}

/// Share of records with a known `returning` flag that are `true`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReturningRate {
    NotAvailable,
    Percent(f64),
}

impl fmt::Display for ReturningRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAvailable => f.write_str("N/A"),
            Self::Percent(pct) => write!(f, "{pct:.1}%"),
        }
    }
}

impl Serialize for ReturningRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::NotAvailable => serializer.serialize_none(),
            Self::Percent(pct) => serializer.serialize_f64(*pct),
        }
    }
}

#[must_use]
pub fn returning_rate<'a, I>(records: I) -> ReturningRate
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let (known, returning) = records
        .into_iter()
        .filter_map(|r| r.returning)
        .fold((0_u64, 0_u64), |(known, yes), flag| (known + 1, yes + u64::from(flag)));
    if known == 0 {
        return ReturningRate::NotAvailable;
    }
    #[allow(clippy::cast_precision_loss)]
    let pct = returning as f64 * 100.0 / known as f64;
    ReturningRate::Percent(pct)
}

/// Newest record of one source, as shown on the overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastVisit {
    pub source_key: String,
    pub last_visit: Option<DateTime<Utc>>,
}

/// Cross-source totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewSummary {
    pub total_visits: usize,
    pub unique_sessions: usize,
    pub last_visits: Vec<LastVisit>,
}

impl OverviewSummary {
    #[must_use]
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            total_visits: dataset.len(),
            unique_sessions: unique_sessions(dataset.records()),
            last_visits: dataset
                .source_keys()
                .iter()
                .map(|key| LastVisit {
                    source_key: key.clone(),
                    last_visit: dataset.last_for(key).map(|r| r.timestamp),
                })
                .collect(),
        }
    }
}

/// KPIs for one source. `in_period` counts the filtered view; everything else
/// is computed over all of the source's records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSummary {
    pub source_key: String,
    pub total_visits: usize,
    pub unique_sessions: usize,
    pub single_visit_sessions: usize,
    pub returning_rate: ReturningRate,
    pub in_period: usize,
}

impl SiteSummary {
    #[must_use]
    pub fn compute(source_key: &str, all: &[&EventRecord], filtered: &[&EventRecord]) -> Self {
        Self {
            source_key: source_key.to_string(),
            total_visits: all.len(),
            unique_sessions: unique_sessions(all.iter().copied()),
            single_visit_sessions: single_visit_sessions(all.iter().copied()),
            returning_rate: returning_rate(all.iter().copied()),
            in_period: filtered.len(),
        }
    }
}

/// One display row of the latest-activity table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRow {
    pub time: String,
    pub location: String,
    pub referrer: String,
    pub timezone: String,
    pub client: String,
}

impl ActivityRow {
    #[must_use]
    pub fn from_record(record: &EventRecord, offset: FixedOffset) -> Self {
        Self {
            time: format_local(record.timestamp, offset),
            location: non_empty_or_placeholder(record.location()),
            referrer: normalize_referrer(&record.referrer),
            timezone: non_empty_or_placeholder(&record.timezone),
            client: client_label(&record.os, record.device_type),
        }
    }
}

/// Newest `limit` records, newest first.
#[must_use]
pub fn latest_activity(records: &[&EventRecord], limit: usize, offset: FixedOffset) -> Vec<ActivityRow> {
    records
        .iter()
        .rev()
        .take(limit)
        .map(|record| ActivityRow::from_record(record, offset))
        .collect()
}

/// `dd/mm/yyyy hh:mm` at the display offset.
#[must_use]
pub fn format_local(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format("%d/%m/%Y %H:%M").to_string()
}

fn non_empty_or_placeholder(value: &str) -> String {
    if value.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        value.to_string()
    }
}

fn client_label(os: &str, device: DeviceType) -> String {
    let parts: Vec<&str> = [os, device_part(device)]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        parts.join(" / ")
    }
}

const fn device_part(device: DeviceType) -> &'static str {
    match device {
        DeviceType::Unknown => "",
        other => other.as_str(),
    }
}
