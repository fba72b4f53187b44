//! Time-series bucketing by granularity.

#![allow(missing_docs)]

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::Serialize;

use crate::analytics::filter::Granularity;
use crate::normalize::record::EventRecord;

/// Number of rows in the top-periods table.
pub const TOP_PERIODS: usize = 10;

/// Per-bucket counts for one source, aligned to [`TimeSeries::labels`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSeries {
    pub source_key: String,
    pub values: Vec<u64>,
}

/// Chart-ready output: ordered labels, one aligned series per source, totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct TimeSeries {
    pub labels: Vec<String>,
    pub series: Vec<SourceSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<Vec<u64>>,
}

impl TimeSeries {
    /// Values for one source, or zeros when the source had no records.
    #[must_use]
    pub fn values_for(&self, source_key: &str) -> Vec<u64> {
        self.series
            .iter()
            .find(|s| s.source_key == source_key)
            .map_or_else(|| vec![0; self.labels.len()], |s| s.values.clone())
    }
}

/// Truncate an instant to the start of its local bucket.
#[must_use]
pub fn bucket_start(ts: DateTime<Utc>, granularity: Granularity, offset: FixedOffset) -> NaiveDateTime {
    let local = ts.with_timezone(&offset).naive_local();
    let date = local.date();
    let (day, hour) = match granularity {
        Granularity::Hour => (date, local.hour()),
        Granularity::Day => (date, 0),
        Granularity::Month => (first_of_month(date), 0),
        Granularity::Year => (first_of_year(date), 0),
    };
    day.and_hms_opt(hour, 0, 0).unwrap_or(local)
}

/// Display label for a truncated bucket start.
#[must_use]
pub fn bucket_label(start: NaiveDateTime, granularity: Granularity) -> String {
    match granularity {
        Granularity::Hour => start.format("%Y-%m-%d %H:00").to_string(),
        Granularity::Day => start.format("%Y-%m-%d").to_string(),
        Granularity::Month => start.format("%Y-%m").to_string(),
        Granularity::Year => start.format("%Y").to_string(),
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn first_of_year(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

/// Bucket records by truncated local time.
///
/// Buckets are ordered by their start instant. Every key in `sources` gets a
/// series, in that order, even with no records in the window; records from
/// any other source follow in first-seen order. Each series is zero-filled to
/// the full bucket list.
#[must_use]
pub fn build_time_series<'a, I>(
    records: I,
    sources: &[String],
    granularity: Granularity,
    offset: FixedOffset,
    include_totals: bool,
) -> TimeSeries
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut buckets: BTreeSet<NaiveDateTime> = BTreeSet::new();
    let mut per_source: Vec<(String, HashMap<NaiveDateTime, u64>)> = sources
        .iter()
        .map(|key| (key.clone(), HashMap::new()))
        .collect();

    for record in records {
        let start = bucket_start(record.timestamp, granularity, offset);
        buckets.insert(start);
        let pos = per_source
            .iter()
            .position(|(key, _)| *key == record.source_key)
            .unwrap_or_else(|| {
                per_source.push((record.source_key.clone(), HashMap::new()));
                per_source.len() - 1
            });
        *per_source[pos].1.entry(start).or_insert(0) += 1;
    }

    let ordered: Vec<NaiveDateTime> = buckets.into_iter().collect();
    let labels = ordered
        .iter()
        .map(|start| bucket_label(*start, granularity))
        .collect();

    let series: Vec<SourceSeries> = per_source
        .into_iter()
        .map(|(source_key, counts)| SourceSeries {
            source_key,
            values: ordered
                .iter()
                .map(|start| counts.get(start).copied().unwrap_or(0))
                .collect(),
        })
        .collect();

    let totals = include_totals.then(|| {
        (0..ordered.len())
            .map(|idx| series.iter().map(|s| s.values[idx]).sum())
            .collect()
    });

    TimeSeries {
        labels,
        series,
        totals,
    }
}

/// Busiest buckets by total count, descending; ties keep chronological order.
#[must_use]
pub fn top_periods(series: &TimeSeries, n: usize) -> Vec<(String, u64)> {
    let totals: Vec<u64> = series.totals.clone().unwrap_or_else(|| {
        (0..series.labels.len())
            .map(|idx| series.series.iter().map(|s| s.values[idx]).sum())
            .collect()
    });
    let mut pairs: Vec<(String, u64)> = series.labels.iter().cloned().zip(totals).collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1));
    pairs.truncate(n);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn rec(source: &str, raw: &str) -> EventRecord {
        let ts = DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc);
        EventRecord::new(source, ts)
    }

    #[test]
    fn day_buckets_from_example() {
        let records = vec![
            rec("portfolio", "2024-01-01T10:00:00Z"),
            rec("portfolio", "2024-01-01T10:05:00Z"),
            rec("portfolio", "2024-01-02T09:00:00Z"),
        ];
        let ts = build_time_series(&records, &[], Granularity::Day, utc(), true);
        assert_eq!(ts.labels, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(ts.values_for("portfolio"), vec![2, 1]);
        assert_eq!(ts.totals, Some(vec![2, 1]));
    }

    #[test]
    fn buckets_sort_chronologically_not_first_seen() {
        let records = vec![
            rec("portfolio", "2024-03-01T00:00:00Z"),
            rec("portfolio", "2023-12-31T23:00:00Z"),
            rec("portfolio", "2024-01-15T00:00:00Z"),
        ];
        let ts = build_time_series(&records, &[], Granularity::Month, utc(), false);
        assert_eq!(ts.labels, vec!["2023-12", "2024-01", "2024-03"]);
        assert!(ts.totals.is_none());
    }

    #[test]
    fn series_zero_fill_and_totals() {
        let records = vec![
            rec("portfolio", "2024-01-01T10:00:00Z"),
            rec("vbp-parana", "2024-01-01T11:30:00Z"),
            rec("vbp-parana", "2024-01-01T11:45:00Z"),
        ];
        let ts = build_time_series(&records, &[], Granularity::Hour, utc(), true);
        assert_eq!(ts.labels, vec!["2024-01-01 10:00", "2024-01-01 11:00"]);
        assert_eq!(ts.values_for("portfolio"), vec![1, 0]);
        assert_eq!(ts.values_for("vbp-parana"), vec![0, 2]);
        assert_eq!(ts.values_for("precos-florestais"), vec![0, 0]);
        assert_eq!(ts.totals, Some(vec![1, 2]));
    }

    #[test]
    fn local_offset_moves_bucket_boundaries() {
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        let records = vec![rec("portfolio", "2024-01-01T02:00:00Z")];
        let ts = build_time_series(&records, &[], Granularity::Year, brt, false);
        assert_eq!(ts.labels, vec!["2023"]);
    }

    #[test]
    fn empty_input_gives_empty_series() {
        let ts = build_time_series(std::iter::empty::<&EventRecord>(), &[], Granularity::Day, utc(), true);
        assert!(ts.labels.is_empty());
        assert!(ts.series.is_empty());
        assert_eq!(ts.totals, Some(Vec::new()));
    }

    #[test]
    fn configured_sources_always_get_a_series_in_order() {
        let keys = vec![
            "portfolio".to_string(),
            "vbp-parana".to_string(),
            "precos-florestais".to_string(),
        ];
        let records = vec![
            rec("vbp-parana", "2024-01-03T10:00:00Z"),
            rec("other", "2024-01-03T11:00:00Z"),
            rec("portfolio", "2024-01-04T10:00:00Z"),
        ];
        let ts = build_time_series(&records, &keys, Granularity::Day, utc(), true);
        let order: Vec<&str> = ts.series.iter().map(|s| s.source_key.as_str()).collect();
        assert_eq!(order, vec!["portfolio", "vbp-parana", "precos-florestais", "other"]);
        assert_eq!(ts.series[0].values, vec![0, 1]);
        assert_eq!(ts.series[2].values, vec![0, 0]);
        assert_eq!(ts.totals, Some(vec![2, 1]));

        let empty = build_time_series(std::iter::empty::<&EventRecord>(), &keys, Granularity::Day, utc(), true);
        assert_eq!(empty.series.len(), 3);
        assert!(empty.series.iter().all(|s| s.values.is_empty()));
    }

    #[test]
    fn top_periods_rank_by_total() {
        let records = vec![
            rec("portfolio", "2024-01-01T10:00:00Z"),
            rec("portfolio", "2024-01-02T10:00:00Z"),
            rec("vbp-parana", "2024-01-02T11:00:00Z"),
            rec("portfolio", "2024-01-03T10:00:00Z"),
        ];
        let ts = build_time_series(&records, &[], Granularity::Day, utc(), false);
        let top = top_periods(&ts, 2);
        assert_eq!(
            top,
            vec![("2024-01-02".to_string(), 2), ("2024-01-01".to_string(), 1)]
        );
    }
}
