//! Watch loop: periodic refresh trigger with at most one refresh in flight.
//!
//! The loop thread owns the ticker and the signal flags. Each trigger runs
//! [`PanelContext::refresh`] on a short-lived `vp-refresh` worker and the
//! outcome comes back over a bounded crossbeam channel, so the loop keeps
//! servicing signals while a slow source is being fetched. A trigger that
//! lands while a refresh is running is recorded as skipped.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded, select, tick};

use crate::core::errors::{PanelError, Result};
use crate::daemon::refresh::{PanelContext, RefreshOutcome};
use crate::daemon::signals::SignalHandler;

/// How often the loop wakes to check signal flags between ticks.
const SIGNAL_POLL: Duration = Duration::from_millis(200);

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub completed: u64,
    pub replaced: u64,
    pub skipped: u64,
    pub uptime: Duration,
}

pub struct WatchLoop {
    context: Arc<PanelContext>,
    signals: SignalHandler,
    poll_interval: Duration,
    max_cycles: Option<u64>,
}

impl WatchLoop {
    #[must_use]
    pub const fn new(context: Arc<PanelContext>, signals: SignalHandler, poll_interval: Duration) -> Self {
        Self {
            context,
            signals,
            poll_interval,
            max_cycles: None,
        }
    }

    /// Stop after this many completed refreshes.
    #[must_use]
    pub const fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Run until shutdown is requested (or `max_cycles` is reached).
    ///
    /// `on_outcome` sees the context after every refresh attempt, skipped or not.
    pub fn run<F>(&self, mut on_outcome: F) -> Result<WatchSummary>
    where
        F: FnMut(&PanelContext, &RefreshOutcome),
    {
        let started = Instant::now();
        let mut summary = WatchSummary::default();
        let (done_tx, done_rx) = bounded::<RefreshOutcome>(2);
        let ticker = tick(self.poll_interval);

        self.context.load_cache_at_startup(Utc::now());
        let mut worker = Some(self.spawn_refresh(false, &done_tx)?);

        loop {
            if self.signals.should_shutdown() {
                break;
            }

            let trigger = if self.signals.take_refresh_request() {
                Some(true)
            } else {
                wait_for_event(&ticker, &done_rx, &mut |outcome| {
                    record(&mut summary, &outcome);
                    on_outcome(&self.context, &outcome);
                })
            };

            if let Some(force) = trigger {
                if self.context.is_refreshing() {
                    let outcome = self.context.refresh(force, Utc::now());
                    record(&mut summary, &outcome);
                    on_outcome(&self.context, &outcome);
                } else {
                    if let Some(handle) = worker.take() {
                        let _ = handle.join();
                    }
                    worker = Some(self.spawn_refresh(force, &done_tx)?);
                }
            }

            if self.max_cycles.is_some_and(|max| summary.completed >= max) {
                break;
            }
        }

        let mut drain = |summary: &mut WatchSummary| {
            while let Ok(outcome) = done_rx.try_recv() {
                record(summary, &outcome);
                on_outcome(&self.context, &outcome);
            }
        };
        drain(&mut summary);
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }
        drain(&mut summary);

        summary.uptime = started.elapsed();
        Ok(summary)
    }

    fn spawn_refresh(
        &self,
        force: bool,
        done_tx: &Sender<RefreshOutcome>,
    ) -> Result<thread::JoinHandle<()>> {
        let context = Arc::clone(&self.context);
        let tx = done_tx.clone();
        thread::Builder::new()
            .name("vp-refresh".to_string())
            .spawn(move || {
                let outcome = context.refresh(force, Utc::now());
                let _ = tx.send(outcome);
            })
            .map_err(|error| PanelError::Runtime {
                details: format!("failed to spawn refresh thread: {error}"),
            })
    }
}

/// Block until the next tick, a finished refresh, or the signal-poll timeout.
///
/// Returns `Some(false)` on a tick (non-forced refresh due).
fn wait_for_event(
    ticker: &Receiver<Instant>,
    done_rx: &Receiver<RefreshOutcome>,
    on_done: &mut dyn FnMut(RefreshOutcome),
) -> Option<bool> {
    select! {
        recv(ticker) -> _ => Some(false),
        recv(done_rx) -> outcome => {
            if let Ok(outcome) = outcome {
                on_done(outcome);
            }
            None
        }
        default(SIGNAL_POLL) => None,
    }
}

fn record(summary: &mut WatchSummary, outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Skipped => summary.skipped += 1,
        RefreshOutcome::Completed { replaced, .. } => {
            summary.completed += 1;
            if *replaced {
                summary.replaced += 1;
            }
        }
    }
}
