//! Panel runtime: application state, refresh cycle, watch loop, signal handling.

#[cfg(feature = "daemon")]
pub mod loop_main;
pub mod refresh;
#[cfg(feature = "daemon")]
pub mod signals;
