//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use visit_panel::prelude::*;
//! ```

// Core
pub use crate::core::cache::{CachedDataset, DatasetCache};
pub use crate::core::config::{Config, SourceConfig};
pub use crate::core::errors::{PanelError, Result};

// Ingest
pub use crate::ingest::gviz::GvizRowSource;
pub use crate::ingest::row::{RawRow, RawTable, Scalar};
pub use crate::ingest::source::{FetchError, RowSource, fetch_with_timeout};

// Normalize
pub use crate::normalize::record::{DeviceType, EventRecord};
pub use crate::normalize::schema::{SchemaNormalizer, SourceKind};

// Dataset
pub use crate::dataset::index::Dataset;
pub use crate::dataset::merge::{dedupe, merge};

// Analytics
pub use crate::analytics::categorical::{CategoryCount, aggregate_categorical, normalize_referrer};
pub use crate::analytics::filter::{FilterState, Granularity, Period, apply_period_filter};
pub use crate::analytics::report::{OverviewReport, SiteReport};
pub use crate::analytics::series::{TimeSeries, build_time_series};

// Runtime
pub use crate::daemon::refresh::{PanelContext, RefreshOutcome, SourceStatus};
