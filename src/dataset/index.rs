//! Dataset: the merged record sequence plus its partition by source.

#![allow(missing_docs)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::normalize::record::EventRecord;

/// Latest timestamp of a chronologically sorted sequence.
#[must_use]
pub fn max_timestamp(records: &[EventRecord]) -> Option<DateTime<Utc>> {
    records.last().map(|record| record.timestamp)
}

/// Immutable snapshot of all known records.
///
/// Built once per successful refresh and swapped in wholesale; partitions
/// hold indices into `records`, so per-source views stay chronological.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    records: Vec<EventRecord>,
    source_order: Vec<String>,
    partitions: HashMap<String, Vec<usize>>,
}

impl Dataset {
    /// Index a merged, time-sorted sequence against the configured source keys.
    ///
    /// Records whose source is not configured are dropped.
    #[must_use]
    pub fn build(merged: Vec<EventRecord>, source_keys: &[String]) -> Self {
        let mut partitions: HashMap<String, Vec<usize>> = source_keys
            .iter()
            .map(|key| (key.clone(), Vec::new()))
            .collect();

        let records: Vec<EventRecord> = merged
            .into_iter()
            .filter(|record| partitions.contains_key(&record.source_key))
            .collect();

        for (idx, record) in records.iter().enumerate() {
            if let Some(slot) = partitions.get_mut(&record.source_key) {
                slot.push(idx);
            }
        }

        Self {
            records,
            source_order: source_keys.to_vec(),
            partitions,
        }
    }

    #[must_use]
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured source keys, in configuration order.
    #[must_use]
    pub fn source_keys(&self) -> &[String] {
        &self.source_order
    }

    /// Records of one source, oldest first. Unknown keys yield an empty list.
    #[must_use]
    pub fn records_for(&self, source_key: &str) -> Vec<&EventRecord> {
        self.partitions
            .get(source_key)
            .map(|indices| indices.iter().map(|&idx| &self.records[idx]).collect())
            .unwrap_or_default()
    }

    /// Newest record of one source.
    #[must_use]
    pub fn last_for(&self, source_key: &str) -> Option<&EventRecord> {
        self.partitions
            .get(source_key)
            .and_then(|indices| indices.last())
            .map(|&idx| &self.records[idx])
    }

    #[must_use]
    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        max_timestamp(&self.records)
    }
}
