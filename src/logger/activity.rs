//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Everything else holds an
//! [`ActivityLoggerHandle`] and sends [`ActivityEvent`]s over a bounded
//! crossbeam channel with `try_send`, so a refresh never blocks on logging.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{PanelError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 512;
/// Minimum gap between attempts to reopen the primary log path.
const RECOVERY_INTERVAL: Duration = Duration::from_secs(30);

/// Events the panel reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    PanelStarted {
        version: String,
        config_hash: String,
    },
    PanelStopped {
        reason: String,
        uptime_secs: u64,
    },
    RefreshCompleted {
        records: u64,
        replaced: bool,
        failed_sources: Vec<String>,
        duration_ms: u64,
    },
    /// A refresh trigger arrived while another cycle was in flight.
    RefreshSkipped,
    SourceFailed {
        source_key: String,
        code: String,
        message: String,
    },
    CacheLoaded {
        records: u64,
    },
    CacheStored {
        records: u64,
    },
    CacheDiscarded {
        reason: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Stops the logger thread after flushing.
    Shutdown,
}

/// Cheaply cloneable, non-blocking sender.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Queue an event. A full channel drops it and bumps the dropped counter.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks until the request is queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Spawn the logger thread.
pub fn spawn_logger(
    jsonl_config: JsonlConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    spawn_logger_with_capacity(jsonl_config, CHANNEL_CAPACITY)
}

pub fn spawn_logger_with_capacity(
    jsonl_config: JsonlConfig,
    capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("vp-logger".to_string())
        .spawn(move || run_logger(&rx, jsonl_config, &dropped))
        .map_err(|error| PanelError::Runtime {
            details: format!("failed to spawn logger thread: {error}"),
        })?;

    Ok((handle, join))
}

fn run_logger(rx: &Receiver<ActivityEvent>, jsonl_config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(jsonl_config);
    let mut last_recovery = Instant::now();

    while let Ok(event) = rx.recv() {
        if jsonl.state() != "primary" && last_recovery.elapsed() >= RECOVERY_INTERVAL {
            jsonl.try_recover();
            last_recovery = Instant::now();
        }

        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{lost} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if event == ActivityEvent::Shutdown {
            break;
        }
        jsonl.write_entry(&to_log_entry(&event));
        jsonl.flush();
    }

    jsonl.sync();
}

fn to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::PanelStarted {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::PanelStart, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::PanelStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::PanelStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::RefreshCompleted {
            records,
            replaced,
            failed_sources,
            duration_ms,
        } => {
            let severity = if failed_sources.is_empty() {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::RefreshComplete, severity);
            e.records = Some(*records);
            e.new_data = Some(*replaced);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(failed_sources.is_empty());
            if !failed_sources.is_empty() {
                e.details = Some(format!("failed={}", failed_sources.join(",")));
            }
            e
        }
        ActivityEvent::RefreshSkipped => {
            let mut e = LogEntry::new(EventType::RefreshSkipped, Severity::Info);
            e.details = Some("refresh already in flight".to_string());
            e
        }
        ActivityEvent::SourceFailed {
            source_key,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::SourceFailed, Severity::Warning);
            e.source = Some(source_key.clone());
            e.ok = Some(false);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::CacheLoaded { records } => {
            let mut e = LogEntry::new(EventType::CacheLoaded, Severity::Info);
            e.records = Some(*records);
            e.ok = Some(true);
            e
        }
        ActivityEvent::CacheStored { records } => {
            let mut e = LogEntry::new(EventType::CacheStored, Severity::Info);
            e.records = Some(*records);
            e.ok = Some(true);
            e
        }
        ActivityEvent::CacheDiscarded { reason } => {
            let mut e = LogEntry::new(EventType::CacheDiscarded, Severity::Info);
            e.details = Some(reason.clone());
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::PanelStop, Severity::Info),
    }
}
