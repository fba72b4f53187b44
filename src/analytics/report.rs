//! Render-pass outputs: everything a view needs, computed from one dataset snapshot.

#![allow(missing_docs)]

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::analytics::categorical::{Distributions, distributions};
use crate::analytics::filter::{FilterState, apply_period_filter};
use crate::analytics::kpi::{ActivityRow, OverviewSummary, SiteSummary, latest_activity};
use crate::analytics::series::{TimeSeries, build_time_series, top_periods};
use crate::dataset::index::Dataset;

/// Display limits applied while building reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLimits {
    pub max_latest: usize,
    pub top_periods: usize,
}

/// `(label, total)` row of the busiest-periods table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodTotal {
    pub label: String,
    pub total: u64,
}

/// Cross-source view: summary cards, filtered series with totals, busiest periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewReport {
    pub summary: OverviewSummary,
    pub series: TimeSeries,
    pub top_periods: Vec<PeriodTotal>,
}

/// Single-source view.
///
/// KPIs, distributions and latest activity use every record of the source;
/// the series and `summary.in_period` use the period-filtered records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteReport {
    pub summary: SiteSummary,
    pub series: TimeSeries,
    pub distributions: Distributions,
    pub latest: Vec<ActivityRow>,
}

#[must_use]
pub fn build_overview(
    dataset: &Dataset,
    filter: &FilterState,
    now: DateTime<Utc>,
    offset: FixedOffset,
    limits: ReportLimits,
) -> OverviewReport {
    let filtered = apply_period_filter(dataset.records(), filter, now, offset);
    let series = build_time_series(
        filtered,
        dataset.source_keys(),
        filter.granularity,
        offset,
        true,
    );
    let top = top_periods(&series, limits.top_periods)
        .into_iter()
        .map(|(label, total)| PeriodTotal { label, total })
        .collect();

    OverviewReport {
        summary: OverviewSummary::from_dataset(dataset),
        series,
        top_periods: top,
    }
}

#[must_use]
pub fn build_site_report(
    dataset: &Dataset,
    source_key: &str,
    filter: &FilterState,
    now: DateTime<Utc>,
    offset: FixedOffset,
    limits: ReportLimits,
) -> SiteReport {
    let all = dataset.records_for(source_key);
    let filtered = apply_period_filter(all.iter().copied(), filter, now, offset);
    let series = build_time_series(
        filtered.iter().copied(),
        &[source_key.to_string()],
        filter.granularity,
        offset,
        false,
    );

    SiteReport {
        summary: SiteSummary::compute(source_key, &all, &filtered),
        series,
        distributions: distributions(all.iter().copied()),
        latest: latest_activity(&all, limits.max_latest, offset),
    }
}
