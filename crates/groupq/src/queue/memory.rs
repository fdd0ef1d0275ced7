//! In-memory implementation of QueueClient for development and tests

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{QueueClient, QueueError, QueueMessage};

/// A stored message and its visibility bookkeeping
struct StoredMessage {
    message: QueueMessage,
    /// Hidden from consumers until this instant; `None` means visible now
    invisible_until: Option<Instant>,
}

struct QueueState {
    messages: VecDeque<StoredMessage>,
    created: bool,
}

/// In-memory implementation of [`QueueClient`]
///
/// This is primarily for testing. It provides the same visibility semantics
/// as a hosted queue service: fetching hides a message for the visibility
/// window and increments its dequeue count, and an undeleted message becomes
/// visible again once the window lapses.
///
/// Deadlines use the tokio clock, so tests running with a paused clock can
/// drive redelivery with `tokio::time::advance`.
///
/// # Example
///
/// ```
/// use groupq::queue::InMemoryQueue;
///
/// let queue = InMemoryQueue::new("orders");
/// ```
pub struct InMemoryQueue {
    name: String,
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    /// Create an empty queue
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                created: false,
            }),
        }
    }

    /// Total number of stored messages, visible or not
    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Number of messages currently visible to a fetch
    pub fn visible_count(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .messages
            .iter()
            .filter(|m| m.invisible_until.map_or(true, |until| until <= now))
            .count()
    }

    /// Message bodies in storage order, for assertions
    pub fn bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .messages
            .iter()
            .map(|m| m.message.body.clone())
            .collect()
    }

    /// Whether `ensure_exists` has been observed
    pub fn was_created(&self) -> bool {
        self.state.lock().created
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.state.lock().messages.clear();
    }

    /// Enqueue a message that has already been delivered `dequeue_count`
    /// times, for exercising dead-letter thresholds in tests
    pub fn enqueue_with_dequeue_count(&self, body: impl Into<String>, dequeue_count: u32) {
        let mut state = self.state.lock();
        state.messages.push_back(StoredMessage {
            message: QueueMessage {
                id: Uuid::now_v7(),
                body: body.into(),
                dequeue_count,
                enqueued_at: Utc::now(),
            },
            invisible_until: None,
        });
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_exists(&self, _cancellation: &CancellationToken) -> Result<(), QueueError> {
        self.state.lock().created = true;
        Ok(())
    }

    async fn fetch_messages(
        &self,
        max_count: usize,
        visibility_timeout: Duration,
        _cancellation: &CancellationToken,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let mut fetched = Vec::new();

        for stored in state.messages.iter_mut() {
            if fetched.len() >= max_count {
                break;
            }

            let visible = stored.invisible_until.map_or(true, |until| until <= now);
            if visible {
                stored.message.dequeue_count += 1;
                stored.invisible_until = Some(now + visibility_timeout);
                fetched.push(stored.message.clone());
            }
        }

        Ok(fetched)
    }

    async fn delete_message(
        &self,
        message: &QueueMessage,
        _cancellation: &CancellationToken,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let position = state
            .messages
            .iter()
            .position(|stored| stored.message.id == message.id)
            .ok_or(QueueError::MessageNotFound(message.id))?;
        state.messages.remove(position);
        Ok(())
    }

    async fn enqueue_message(
        &self,
        body: &str,
        _cancellation: &CancellationToken,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        state.messages.push_back(StoredMessage {
            message: QueueMessage {
                id: Uuid::now_v7(),
                body: body.to_string(),
                dequeue_count: 0,
                enqueued_at: Utc::now(),
            },
            invisible_until: None,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_fetch_hides_messages_and_counts_delivery() {
        let queue = InMemoryQueue::new("orders");
        queue.enqueue_message("a", &token()).await.unwrap();
        queue.enqueue_message("b", &token()).await.unwrap();

        let batch = queue
            .fetch_messages(10, Duration::from_secs(60), &token())
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|m| m.dequeue_count == 1));

        // Both are invisible now
        let again = queue
            .fetch_messages(10, Duration::from_secs(60), &token())
            .await
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(queue.message_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undeleted_messages_become_visible_again() {
        let queue = InMemoryQueue::new("orders");
        queue.enqueue_message("a", &token()).await.unwrap();

        let first = queue
            .fetch_messages(1, Duration::from_secs(30), &token())
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;

        let second = queue
            .fetch_messages(1, Duration::from_secs(30), &token())
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].dequeue_count, 2);
    }

    #[tokio::test]
    async fn test_fetch_respects_max_count_and_order() {
        let queue = InMemoryQueue::new("orders");
        for body in ["a", "b", "c"] {
            queue.enqueue_message(body, &token()).await.unwrap();
        }

        let batch = queue
            .fetch_messages(2, Duration::from_secs(60), &token())
            .await
            .unwrap();
        let bodies: Vec<_> = batch.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_removes_by_identity() {
        let queue = InMemoryQueue::new("orders");
        queue.enqueue_message("a", &token()).await.unwrap();

        let batch = queue
            .fetch_messages(1, Duration::from_secs(60), &token())
            .await
            .unwrap();
        queue.delete_message(&batch[0], &token()).await.unwrap();
        assert_eq!(queue.message_count(), 0);

        let result = queue.delete_message(&batch[0], &token()).await;
        assert!(matches!(result, Err(QueueError::MessageNotFound(_))));
    }

    #[tokio::test]
    async fn test_ensure_exists_is_recorded() {
        let queue = InMemoryQueue::new("orders");
        assert!(!queue.was_created());
        queue.ensure_exists(&token()).await.unwrap();
        assert!(queue.was_created());
    }
}
