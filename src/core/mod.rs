//! Core types: errors, configuration, dataset cache.

pub mod cache;
pub mod config;
pub mod errors;
