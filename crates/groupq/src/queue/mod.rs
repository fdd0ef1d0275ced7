//! Queue client boundary
//!
//! This module provides:
//! - [`QueueClient`] - Transport-agnostic queue operations (fetch with
//!   visibility timeout, targeted delete, enqueue, create-if-missing)
//! - [`QueueMessage`] - A delivered message and its metadata
//! - [`InMemoryQueue`] - In-process implementation for development and tests
//!
//! Implementations must be safe for concurrent use: the poll loop fetches
//! while processing tasks delete and enqueue on the same client.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use memory::InMemoryQueue;

/// Error type for queue operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Message not found (already deleted, or the identity is stale)
    #[error("message not found: {0}")]
    MessageNotFound(Uuid),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// A message delivered from a queue
///
/// The queue owns the message; the listener holds this value only for the
/// duration of one processing attempt. A fetched-but-undeleted message
/// becomes visible to other consumers again once its visibility window
/// lapses, so delivery is at-least-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Identity used for targeted delete
    pub id: Uuid,

    /// Opaque payload, UTF-8 text (typically JSON)
    pub body: String,

    /// How many times this message has been delivered, this delivery included
    pub dequeue_count: u32,

    /// When the message was first enqueued
    pub enqueued_at: DateTime<Utc>,
}

/// Transport-agnostic queue operations
///
/// Every operation takes the cancellation token explicitly; implementations
/// should abandon in-flight I/O when it fires rather than consulting any
/// ambient state.
#[async_trait]
pub trait QueueClient: Send + Sync + 'static {
    /// Queue name, for diagnostics
    fn name(&self) -> &str;

    /// Create the queue if it does not exist
    async fn ensure_exists(&self, cancellation: &CancellationToken) -> Result<(), QueueError>;

    /// Fetch up to `max_count` messages, hiding each from other consumers
    /// for `visibility_timeout`
    ///
    /// May return fewer messages than requested, including none.
    async fn fetch_messages(
        &self,
        max_count: usize,
        visibility_timeout: Duration,
        cancellation: &CancellationToken,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete a previously fetched message
    async fn delete_message(
        &self,
        message: &QueueMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), QueueError>;

    /// Enqueue a new message with the given body
    async fn enqueue_message(
        &self,
        body: &str,
        cancellation: &CancellationToken,
    ) -> Result<(), QueueError>;
}

/// Normalize a queue name the way queue services expect them
pub fn normalize_queue_name(name: &str) -> String {
    name.to_lowercase()
}

/// Name of the dead-letter companion for a source queue
pub fn poison_queue_name(name: &str) -> String {
    format!("{}-poison", normalize_queue_name(name))
}
