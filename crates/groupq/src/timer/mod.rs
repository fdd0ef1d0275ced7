//! Self-scheduling timers
//!
//! This module provides:
//! - [`SeriesTimer`] - Runs a command repeatedly, each run choosing the next wait
//! - [`RandomizedExponentialBackoff`] - Jittered backoff for idle polling

mod backoff;
mod series;

pub use backoff::{BackoffError, RandomizedExponentialBackoff};
pub use series::{CommandError, CommandResult, SeriesCommand, SeriesTimer, TimerError};
