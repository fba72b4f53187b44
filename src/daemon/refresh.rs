//! Explicit application state and the refresh cycle.
//!
//! [`PanelContext`] owns everything the panel knows: the current dataset
//! snapshot, per-source status, filters, and the cache. A refresh fetches every
//! source (each behind its own timeout), normalizes and merges the rows, and
//! swaps the dataset in only when the replacement policy allows it. Readers
//! hold an `Arc<Dataset>` and never see a half-built snapshot.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::analytics::filter::FilterState;
use crate::analytics::report::{
    OverviewReport, ReportLimits, SiteReport, build_overview, build_site_report,
};
use crate::core::cache::{CacheMiss, CachedDataset, DatasetCache};
use crate::core::config::{Config, SourceConfig};
use crate::core::errors::{PanelError, Result};
use crate::dataset::index::Dataset;
use crate::dataset::merge::merge;
use crate::ingest::source::{RowSource, fetch_with_timeout};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::normalize::record::EventRecord;
use crate::normalize::schema::SchemaNormalizer;

/// Outcome of the last fetch for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SourceStatus {
    Ok,
    Error { code: String, message: String },
}

impl SourceStatus {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// `ok` iff every source is ok.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Ok,
    Error,
}

impl OverallStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Per-source status in configuration order.
pub type StatusMap = Vec<(String, SourceStatus)>;

#[must_use]
pub fn overall_status(status: &StatusMap) -> OverallStatus {
    if status.iter().all(|(_, s)| s.is_ok()) {
        OverallStatus::Ok
    } else {
        OverallStatus::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Another refresh was already running.
    Skipped,
    Completed {
        replaced: bool,
        records: usize,
        status: OverallStatus,
        failed_sources: Vec<String>,
    },
}

/// Replace when forced, when nothing was loaded, or when strictly newer data
/// arrived. A cycle in which no source answered never replaces, forced or not.
#[must_use]
pub fn should_replace(
    force: bool,
    any_fetched: bool,
    previous_max: Option<DateTime<Utc>>,
    next_max: Option<DateTime<Utc>>,
) -> bool {
    match (previous_max, next_max) {
        _ if !any_fetched => false,
        _ if force => true,
        (None, _) => true,
        (Some(prev), Some(next)) => next > prev,
        (Some(_), None) => false,
    }
}

/// Resets the in-flight flag when a refresh ends, including by panic.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Application state shared by the CLI, the watch loop and any reader.
pub struct PanelContext {
    sources: Vec<SourceConfig>,
    source_keys: Vec<String>,
    normalizer: SchemaNormalizer,
    row_source: Arc<dyn RowSource>,
    fetch_timeout: Duration,
    parallel_fetch: bool,
    limits: ReportLimits,
    dataset: RwLock<Arc<Dataset>>,
    filters: RwLock<FilterState>,
    status: RwLock<StatusMap>,
    last_fetched: RwLock<Option<DateTime<Utc>>>,
    in_flight: AtomicBool,
    cache: Option<DatasetCache>,
    logger: Option<ActivityLoggerHandle>,
}

impl PanelContext {
    /// Build from configuration. The cache is attached when `cache.enabled`.
    pub fn new(config: &Config, row_source: Arc<dyn RowSource>) -> Result<Self> {
        let normalizer = SchemaNormalizer::new(config.display.offset())?;
        let cache = config
            .cache
            .enabled
            .then(|| DatasetCache::new(config.cache.file.clone(), config.cache.max_age()));
        let source_keys = config.source_keys();
        let status = source_keys
            .iter()
            .map(|key| (key.clone(), SourceStatus::Ok))
            .collect();

        Ok(Self {
            sources: config.sources.clone(),
            dataset: RwLock::new(Arc::new(Dataset::build(Vec::new(), &source_keys))),
            source_keys,
            normalizer,
            row_source,
            fetch_timeout: config.refresh.fetch_timeout(),
            parallel_fetch: config.refresh.parallel_fetch,
            limits: ReportLimits {
                max_latest: config.display.max_latest,
                top_periods: config.display.top_periods,
            },
            filters: RwLock::new(FilterState::default()),
            status: RwLock::new(status),
            last_fetched: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            cache,
            logger: None,
        })
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    // ──────────────────── reads ────────────────────

    /// Current snapshot. Cheap; never blocks on a running refresh.
    #[must_use]
    pub fn dataset(&self) -> Arc<Dataset> {
        Arc::clone(&self.dataset.read())
    }

    #[must_use]
    pub fn status(&self) -> StatusMap {
        self.status.read().clone()
    }

    #[must_use]
    pub fn overall_status(&self) -> OverallStatus {
        overall_status(&self.status.read())
    }

    #[must_use]
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        *self.last_fetched.read()
    }

    #[must_use]
    pub fn filters(&self) -> FilterState {
        self.filters.read().clone()
    }

    pub fn set_filters(&self, filters: FilterState) {
        *self.filters.write() = filters;
    }

    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.normalizer.offset()
    }

    #[must_use]
    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn source(&self, key: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|source| source.key == key)
            .ok_or_else(|| PanelError::UnknownSource {
                key: key.to_string(),
            })
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn overview(&self, now: DateTime<Utc>) -> OverviewReport {
        build_overview(&self.dataset(), &self.filters(), now, self.offset(), self.limits)
    }

    pub fn site_report(&self, key: &str, now: DateTime<Utc>) -> Result<SiteReport> {
        self.source(key)?;
        Ok(build_site_report(
            &self.dataset(),
            key,
            &self.filters(),
            now,
            self.offset(),
            self.limits,
        ))
    }

    // ──────────────────── cache ────────────────────

    /// Seed the dataset from a fresh cache blob. Returns the number of records loaded.
    pub fn load_cache_at_startup(&self, now: DateTime<Utc>) -> Option<usize> {
        let cache = self.cache.as_ref()?;
        match cache.load_fresh(now) {
            Ok(Ok(entry)) => {
                let dataset = Dataset::build(merge([entry.data]), &self.source_keys);
                let records = dataset.len();
                *self.dataset.write() = Arc::new(dataset);
                *self.last_fetched.write() = entry.fetched_at;
                self.log(ActivityEvent::CacheLoaded {
                    records: records as u64,
                });
                Some(records)
            }
            Ok(Err(CacheMiss::Absent)) => None,
            Ok(Err(miss)) => {
                self.log(ActivityEvent::CacheDiscarded {
                    reason: miss.as_str().to_string(),
                });
                None
            }
            Err(error) => {
                self.log(ActivityEvent::CacheDiscarded {
                    reason: format!("unreadable: {error}"),
                });
                None
            }
        }
    }

    fn store_cache(&self, dataset: &Dataset, fetched_at: DateTime<Utc>) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let entry = CachedDataset::new(fetched_at, dataset.records().to_vec());
        match cache.store(&entry) {
            Ok(()) => self.log(ActivityEvent::CacheStored {
                records: dataset.len() as u64,
            }),
            Err(error) => {
                let err = PanelError::io(cache.path(), error);
                self.log(ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    // ──────────────────── refresh ────────────────────

    /// Run one refresh cycle. At most one cycle runs at a time; a concurrent
    /// call returns [`RefreshOutcome::Skipped`] immediately.
    pub fn refresh(&self, force: bool, now: DateTime<Utc>) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.log(ActivityEvent::RefreshSkipped);
            return RefreshOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);
        let started = Instant::now();

        let previous_max = self.dataset.read().max_timestamp();
        let results = self.fetch_all();

        let mut batches = Vec::with_capacity(results.len());
        let mut status = Vec::with_capacity(results.len());
        let mut failed_sources = Vec::new();
        for (key, result) in results {
            match result {
                Ok(records) => {
                    batches.push(records);
                    status.push((key, SourceStatus::Ok));
                }
                Err(error) => {
                    self.log(ActivityEvent::SourceFailed {
                        source_key: key.clone(),
                        code: error.code().to_string(),
                        message: error.to_string(),
                    });
                    failed_sources.push(key.clone());
                    status.push((
                        key,
                        SourceStatus::Error {
                            code: error.code().to_string(),
                            message: error.to_string(),
                        },
                    ));
                }
            }
        }

        let any_fetched = !batches.is_empty();
        let next = Dataset::build(merge(batches), &self.source_keys);
        let replaced = should_replace(force, any_fetched, previous_max, next.max_timestamp());
        let overall = overall_status(&status);

        *self.status.write() = status;
        *self.last_fetched.write() = Some(now);

        let records = if replaced {
            let next = Arc::new(next);
            *self.dataset.write() = Arc::clone(&next);
            self.store_cache(&next, now);
            next.len()
        } else {
            self.dataset.read().len()
        };

        self.log(ActivityEvent::RefreshCompleted {
            records: records as u64,
            replaced,
            failed_sources: failed_sources.clone(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });

        RefreshOutcome::Completed {
            replaced,
            records,
            status: overall,
            failed_sources,
        }
    }

    fn fetch_all(&self) -> Vec<(String, Result<Vec<EventRecord>>)> {
        if self.parallel_fetch && self.sources.len() > 1 {
            thread::scope(|scope| {
                let handles: Vec<_> = self
                    .sources
                    .iter()
                    .map(|source| (source.key.clone(), scope.spawn(move || self.fetch_source(source))))
                    .collect();
                handles
                    .into_iter()
                    .map(|(key, handle)| {
                        let result = handle.join().unwrap_or_else(|_| {
                            Err(PanelError::Runtime {
                                details: format!("fetch thread for {key} panicked"),
                            })
                        });
                        (key, result)
                    })
                    .collect()
            })
        } else {
            self.sources
                .iter()
                .map(|source| (source.key.clone(), self.fetch_source(source)))
                .collect()
        }
    }

    /// Fetch every tab of one source. Any failing tab fails the whole source.
    fn fetch_source(&self, source: &SourceConfig) -> Result<Vec<EventRecord>> {
        let mut records = Vec::new();
        for gid in source.gids.iter().filter(|gid| !gid.is_empty()) {
            let table =
                fetch_with_timeout(&self.row_source, &source.sheet_id, gid, self.fetch_timeout)
                    .map_err(|error| PanelError::fetch(&source.key, error))?;
            let rows = table.into_rows();
            records.extend(self.normalizer.normalize_rows(source.kind, &source.key, &rows));
        }
        Ok(records)
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}
