//! Signal flags for the watch loop: SIGTERM/SIGINT stop it, SIGUSR1 forces a refresh.
//!
//! Registration goes through `signal-hook`; the loop polls the flags between ticks.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Shared flags set by OS signals or programmatically.
#[derive(Clone, Default)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    refresh_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register OS signal hooks. Failures are reported, not fatal.
    #[must_use]
    pub fn new() -> Self {
        let handler = Self::detached();
        handler.register_signals();
        handler
    }

    /// Flags only, no OS registration.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Check and clear a pending forced-refresh request.
    #[must_use]
    pub fn take_refresh_request(&self) -> bool {
        self.refresh_flag.swap(false, Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_refresh(&self) {
        self.refresh_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        for (signal, name) in [(SIGTERM, "SIGTERM"), (SIGINT, "SIGINT")] {
            if let Err(error) = signal_hook::flag::register(signal, Arc::clone(&self.shutdown_flag))
            {
                eprintln!("[VP-SIGNAL] failed to register {name}: {error}");
            }
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::SIGUSR1;
            if let Err(error) = signal_hook::flag::register(SIGUSR1, Arc::clone(&self.refresh_flag))
            {
                eprintln!("[VP-SIGNAL] failed to register SIGUSR1: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_start_clear() {
        let handler = SignalHandler::detached();
        assert!(!handler.should_shutdown());
        assert!(!handler.take_refresh_request());
    }

    #[test]
    fn refresh_request_is_consumed_once() {
        let handler = SignalHandler::detached();
        handler.request_refresh();
        assert!(handler.take_refresh_request());
        assert!(!handler.take_refresh_request());
    }

    #[test]
    fn shutdown_is_sticky_and_shared_by_clones() {
        let handler = SignalHandler::detached();
        let clone = handler.clone();
        clone.request_shutdown();
        assert!(handler.should_shutdown());
        assert!(handler.should_shutdown());
    }
}
