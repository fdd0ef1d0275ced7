//! Executor boundary
//!
//! This module provides:
//! - [`BatchExecutor`] - The processing hook invoked with each fetched batch
//! - [`ExecutionOutcome`] - Tagged verdict of one batch execution
//! - [`handler_fn`] - Adapter turning an async closure into an executor
//! - [`TypedExecutor`] - JSON-decoding wrapper for typed handlers

mod typed;

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::queue::QueueMessage;

pub use typed::{decode_batch, CodecError, TypedExecutor};

/// Verdict of one batch execution
///
/// The distinction between failure and cancellation is deliberate:
/// a failed batch is eligible for dead-lettering, a cancelled one is a clean
/// abort whose messages simply redeliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Processing succeeded; the batch will be deleted from the source queue
    Completed,

    /// Processing failed; messages past their delivery budget are
    /// dead-lettered, the rest are left to redeliver
    Failed,

    /// Processing observed cancellation; nothing is deleted or escalated
    Cancelled,
}

/// Processes one batch of messages
///
/// Implementations run concurrently with the poll loop and with each other,
/// so they must not assume exclusive access to shared resources. An executor
/// that observes the cancellation token should return
/// [`ExecutionOutcome::Cancelled`] rather than a failure.
#[async_trait]
pub trait BatchExecutor: Send + Sync + 'static {
    /// Run the caller's processing logic on one batch
    async fn execute(
        &self,
        batch: &[QueueMessage],
        cancellation: &CancellationToken,
    ) -> ExecutionOutcome;
}

type BoxedHandler =
    Box<dyn Fn(Vec<QueueMessage>) -> BoxFuture<'static, ExecutionOutcome> + Send + Sync>;

/// [`BatchExecutor`] backed by an async closure, built with [`handler_fn`]
pub struct FnExecutor {
    handler: BoxedHandler,
}

/// Turn an async closure over the raw batch into a [`BatchExecutor`]
///
/// # Example
///
/// ```
/// use groupq::executor::{handler_fn, ExecutionOutcome};
///
/// let executor = handler_fn(|batch| async move {
///     for message in &batch {
///         println!("processing {}", message.body);
///     }
///     ExecutionOutcome::Completed
/// });
/// # let _ = executor;
/// ```
pub fn handler_fn<F, Fut>(handler: F) -> FnExecutor
where
    F: Fn(Vec<QueueMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ExecutionOutcome> + Send + 'static,
{
    FnExecutor {
        handler: Box::new(move |batch| handler(batch).boxed()),
    }
}

#[async_trait]
impl BatchExecutor for FnExecutor {
    async fn execute(
        &self,
        batch: &[QueueMessage],
        _cancellation: &CancellationToken,
    ) -> ExecutionOutcome {
        (self.handler)(batch.to_vec()).await
    }
}
