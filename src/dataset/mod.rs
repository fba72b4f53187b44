//! Merged dataset: deduplication, chronological merge, and per-source index.

pub mod index;
pub mod merge;
