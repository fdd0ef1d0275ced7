//! # Groupq
//!
//! An adaptive batch poller for durable message queues.
//!
//! ## Features
//!
//! - **Self-scheduling poll loop**: each cycle decides its own wait, so idle
//!   queues back off and busy queues drain at full speed
//! - **Randomized exponential backoff**: jittered growth between a floor and
//!   a ceiling, snapping back to the floor as soon as work appears
//! - **Bounded concurrency**: fetched batches process in the background,
//!   capped at half the group size in flight
//! - **Dead-letter escalation**: failed messages past their delivery budget
//!   are copied to a poison queue and removed from the source
//! - **Graceful shutdown**: stopping joins the poll loop and every in-flight
//!   batch; no orphaned background work survives
//!
//! Delivery is at-least-once: a fetched-but-undeleted message reappears once
//! its visibility window lapses. The engine never promises cross-batch
//! ordering.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      BatchListener                       │
//! │   (poll cycle: fetch → dispatch → drain │ backoff)       │
//! └──────────────────────────────────────────────────────────┘
//!                  │                        │
//!                  ▼                        ▼
//! ┌───────────────────────────┐  ┌────────────────────────── ┐
//! │       SeriesTimer         │  │ RandomizedExponential     │
//! │ (runs the cycle, waits as │  │ Backoff (idle pacing)     │
//! │  the cycle instructs)     │  └───────────────────────────┘
//! └───────────────────────────┘
//!                  │
//!                  ▼
//! ┌───────────────────────────┐  ┌───────────────────────────┐
//! │ QueueClient (transport)   │  │ BatchExecutor (your code) │
//! └───────────────────────────┘  └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use groupq::prelude::*;
//!
//! let queue = Arc::new(InMemoryQueue::new("orders"));
//! let poison = Arc::new(InMemoryQueue::new("orders-poison"));
//!
//! let executor = Arc::new(handler_fn(|batch| async move {
//!     for message in &batch {
//!         println!("processing {}", message.body);
//!     }
//!     ExecutionOutcome::Completed
//! }));
//!
//! let listener = BatchListener::new(
//!     executor,
//!     queue,
//!     Some(poison),
//!     ListenerConfig::default().with_group_size(16),
//! )?;
//!
//! listener.start()?;
//! // ... until shutdown
//! listener.stop(Duration::from_secs(30)).await?;
//! # Ok::<(), groupq::listener::ListenerError>(())
//! ```

pub mod executor;
pub mod listener;
pub mod queue;
pub mod timer;

/// Prelude for common imports
pub mod prelude {
    pub use crate::executor::{
        decode_batch, handler_fn, BatchExecutor, ExecutionOutcome, TypedExecutor,
    };
    pub use crate::listener::{BatchListener, ConfigError, ListenerConfig, ListenerError};
    pub use crate::queue::{InMemoryQueue, QueueClient, QueueError, QueueMessage};
    pub use crate::timer::{RandomizedExponentialBackoff, SeriesCommand, SeriesTimer};
}

// Re-export key types at crate root
pub use executor::{BatchExecutor, ExecutionOutcome, TypedExecutor};
pub use listener::{BatchListener, ConfigError, ListenerConfig, ListenerError};
pub use queue::{InMemoryQueue, QueueClient, QueueError, QueueMessage};
pub use timer::{RandomizedExponentialBackoff, SeriesCommand, SeriesTimer, TimerError};
