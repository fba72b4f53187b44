//! Deduplicate per-source batches and merge them into one chronological sequence.

use std::collections::HashSet;

use crate::normalize::record::EventRecord;

/// Drop later records whose identity key was already seen. Order is preserved.
#[must_use]
pub fn dedupe(records: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.identity_key()))
        .collect()
}

/// Dedupe each batch, concatenate in batch order, then stable-sort by time.
///
/// Records with equal timestamps keep their concatenation order, so merging
/// the same input twice yields the same sequence.
#[must_use]
pub fn merge<I>(batches: I) -> Vec<EventRecord>
where
    I: IntoIterator<Item = Vec<EventRecord>>,
{
    let mut merged: Vec<EventRecord> = batches.into_iter().flat_map(dedupe).collect();
    merged.sort_by_key(|record| record.timestamp);
    merged
}
