//! Row source abstraction and bounded-wait fetching.
//!
//! A [`RowSource`] is a request/response transport: one call per
//! `(endpoint, sub_range)` pair, returning a [`RawTable`] or a [`FetchError`].
//! [`fetch_with_timeout`] runs the call on a short-lived worker thread and
//! gives up after a fixed wait, so a hung transport fails only its own source.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use thiserror::Error;

use crate::ingest::row::RawTable;

/// Failure scoped to one source fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("transport failure: {details}")]
    Transport { details: String },

    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("feed reported an error: {message}")]
    Remote { message: String },

    #[error("malformed response: {details}")]
    Malformed { details: String },
}

impl FetchError {
    /// Short label used in activity logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport",
            Self::Http { .. } => "http",
            Self::Remote { .. } => "remote",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// Transport returning raw tabular data for one `(endpoint, sub_range)` pair.
pub trait RowSource: Send + Sync {
    fn fetch(&self, endpoint: &str, sub_range: &str) -> Result<RawTable, FetchError>;
}

impl<T: RowSource + ?Sized> RowSource for Arc<T> {
    fn fetch(&self, endpoint: &str, sub_range: &str) -> Result<RawTable, FetchError> {
        (**self).fetch(endpoint, sub_range)
    }
}

/// Fetch with a hard deadline.
///
/// The worker thread owns its own reply channel; once the deadline passes the
/// receiver is dropped and a late reply is discarded, so two overlapping
/// fetches never observe each other's results.
pub fn fetch_with_timeout(
    source: &Arc<dyn RowSource>,
    endpoint: &str,
    sub_range: &str,
    timeout: Duration,
) -> Result<RawTable, FetchError> {
    let (tx, rx) = bounded::<Result<RawTable, FetchError>>(1);
    let worker_source = Arc::clone(source);
    let endpoint_owned = endpoint.to_string();
    let sub_range_owned = sub_range.to_string();

    thread::Builder::new()
        .name("vp-fetch".to_string())
        .spawn(move || {
            let result = worker_source.fetch(&endpoint_owned, &sub_range_owned);
            let _ = tx.send(result);
        })
        .map_err(|e| FetchError::Transport {
            details: format!("failed to spawn fetch thread: {e}"),
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(FetchError::Timeout {
            after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(FetchError::Transport {
            details: "fetch worker exited without a reply".to_string(),
        }),
    }
}
