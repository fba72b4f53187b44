#![forbid(unsafe_code)]

//! Visit panel: visit-log analytics over spreadsheet-backed sources.
//!
//! Pipeline:
//! 1. **Ingest**: fetch raw tables per source and tab through a [`ingest::source::RowSource`]
//! 2. **Normalize**: map each source's column aliases onto one event record shape
//! 3. **Merge**: deduplicate per source, merge chronologically, index by source
//! 4. **Aggregate**: period filtering, time series, distributions, KPIs
//!
//! # Library usage
//!
//! ```rust,no_run
//! use visit_panel::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use visit_panel::analytics::series::build_time_series;
//! use visit_panel::core::config::Config;
//! ```

pub mod prelude;

pub mod analytics;
pub mod core;
pub mod daemon;
pub mod dataset;
pub mod ingest;
pub mod logger;
pub mod normalize;
