//! File-backed, age-bounded cache for the merged dataset.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalize::record::EventRecord;

/// Versioned key stored in every blob; a blob with any other key is ignored.
pub const CACHE_KEY: &str = "controlpanel-cache-v3";

/// Persisted snapshot of the last accepted dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedDataset {
    pub cache_key: String,
    pub fetched_at: Option<DateTime<Utc>>,
    pub data: Vec<EventRecord>,
}

impl CachedDataset {
    #[must_use]
    pub fn new(fetched_at: DateTime<Utc>, data: Vec<EventRecord>) -> Self {
        Self {
            cache_key: CACHE_KEY.to_string(),
            fetched_at: Some(fetched_at),
            data,
        }
    }
}

/// Why a present cache blob was not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMiss {
    Absent,
    Stale,
    ForeignKey,
}

impl CacheMiss {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Stale => "stale",
            Self::ForeignKey => "foreign_key",
        }
    }
}

/// File-backed dataset cache with max-age semantics.
#[derive(Debug, Clone)]
pub struct DatasetCache {
    path: PathBuf,
    max_age: Duration,
}

impl DatasetCache {
    #[must_use]
    pub const fn new(path: PathBuf, max_age: Duration) -> Self {
        Self { path, max_age }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Load the blob if present, keyed correctly, and no older than `max_age` at `now`.
    pub fn load_fresh(&self, now: DateTime<Utc>) -> io::Result<Result<CachedDataset, CacheMiss>> {
        if !self.path.exists() {
            return Ok(Err(CacheMiss::Absent));
        }

        let raw = fs::read_to_string(&self.path)?;
        let entry: CachedDataset = serde_json::from_str(&raw).map_err(|error| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse dataset cache: {error}"),
            )
        })?;

        if entry.cache_key != CACHE_KEY {
            return Ok(Err(CacheMiss::ForeignKey));
        }
        if !is_fresh(entry.fetched_at, now, self.max_age) {
            return Ok(Err(CacheMiss::Stale));
        }
        Ok(Ok(entry))
    }

    /// Store the blob using atomic rename.
    pub fn store(&self, entry: &CachedDataset) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let data = serde_json::to_vec(entry).map_err(|error| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to serialize dataset cache: {error}"),
            )
        })?;

        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Remove the cache file if present.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error),
        }
    }
}

/// A blob without a fetch time is never fresh. The boundary age counts as fresh.
fn is_fresh(fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age: Duration) -> bool {
    let Some(fetched_at) = fetched_at else {
        return false;
    };
    let age = (now - fetched_at).to_std().unwrap_or(Duration::ZERO);
    age <= max_age
}
