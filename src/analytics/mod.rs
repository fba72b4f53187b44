//! Filter & aggregation engine: period filtering, time series, distributions, KPIs.

pub mod categorical;
pub mod filter;
pub mod kpi;
pub mod report;
pub mod series;
