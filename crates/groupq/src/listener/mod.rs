//! Batch queue listener
//!
//! This module provides:
//! - [`BatchListener`] - Adaptive poll/dispatch/settle engine over a queue
//! - [`ListenerConfig`] - Group size, polling bounds, delivery budget
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       BatchListener                        │
//! │  ┌──────────────┐   fetch ≤ group_size    ┌─────────────┐  │
//! │  │ SeriesTimer  │────────────────────────▶│ QueueClient │  │
//! │  │  (poll loop) │                         └─────────────┘  │
//! │  └──────┬───────┘                                          │
//! │         │ empty → backoff wait      non-empty → dispatch   │
//! │         ▼                                    ▼             │
//! │  ┌───────────────────────┐   ┌──────────────────────────┐  │
//! │  │ RandomizedExponential │   │ JoinSet of batch tasks   │  │
//! │  │ Backoff               │   │ (drained to group/2)     │  │
//! │  └───────────────────────┘   └───────────┬──────────────┘  │
//! │                                          ▼                 │
//! │                            delete / dead-letter / redeliver│
//! └────────────────────────────────────────────────────────────┘
//! ```

mod batch;
mod config;

pub use batch::{BatchListener, ListenerError};
pub use config::{
    ConfigError, ListenerConfig, DEFAULT_GROUP_SIZE, DEFAULT_MAXIMUM_POLL_INTERVAL,
    DEFAULT_MAX_DEQUEUE_COUNT, DEFAULT_VISIBILITY_TIMEOUT, MINIMUM_POLL_INTERVAL,
};
