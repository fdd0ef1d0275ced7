//! Typed JSON binding for batch handlers

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use super::{BatchExecutor, ExecutionOutcome};
use crate::queue::QueueMessage;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error decoding a message body into the target type
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The body is not valid JSON for the target type
    #[error("message {id} does not decode to the target type: {source}")]
    Decode {
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode every body in a batch as JSON into `Vec<T>`, in fetch order
///
/// Fails on the first undecodable message; a batch is bound as a unit, so a
/// single bad body fails the whole group.
pub fn decode_batch<T: DeserializeOwned>(batch: &[QueueMessage]) -> Result<Vec<T>, CodecError> {
    batch
        .iter()
        .map(|message| {
            serde_json::from_str(&message.body).map_err(|source| CodecError::Decode {
                id: message.id,
                source,
            })
        })
        .collect()
}

type TypedHandler<T> = Box<dyn Fn(Vec<T>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// [`BatchExecutor`] that decodes JSON bodies into `Vec<T>` before invoking a
/// typed handler
///
/// A batch that fails to decode yields a failed verdict, so persistently
/// malformed messages flow into the dead-letter path once they exhaust their
/// delivery budget.
///
/// # Example
///
/// ```
/// use groupq::executor::TypedExecutor;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Order {
///     id: u64,
/// }
///
/// let executor = TypedExecutor::new(|orders: Vec<Order>| async move {
///     for order in &orders {
///         println!("order {}", order.id);
///     }
///     Ok::<(), std::io::Error>(())
/// });
/// # let _ = executor;
/// ```
pub struct TypedExecutor<T> {
    handler: TypedHandler<T>,
}

impl<T> TypedExecutor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Wrap a typed async handler
    pub fn new<F, Fut, E>(handler: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            handler: Box::new(move |items| {
                let fut = handler(items);
                async move { fut.await.map_err(Into::into) }.boxed()
            }),
        }
    }
}

#[async_trait]
impl<T> BatchExecutor for TypedExecutor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn execute(
        &self,
        batch: &[QueueMessage],
        cancellation: &CancellationToken,
    ) -> ExecutionOutcome {
        if cancellation.is_cancelled() {
            return ExecutionOutcome::Cancelled;
        }

        let decoded = match decode_batch::<T>(batch) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(error = %error, "failed to decode batch");
                return ExecutionOutcome::Failed;
            }
        };

        match (self.handler)(decoded).await {
            Ok(()) => ExecutionOutcome::Completed,
            Err(error) => {
                warn!(error = %error, "typed handler failed");
                ExecutionOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: u64,
    }

    fn message(body: &str) -> QueueMessage {
        QueueMessage {
            id: Uuid::now_v7(),
            body: body.to_string(),
            dequeue_count: 1,
            enqueued_at: Utc::now(),
        }
    }

    #[test]
    fn test_decode_batch_preserves_order() {
        let batch = vec![message(r#"{"id":1}"#), message(r#"{"id":2}"#)];
        let orders: Vec<Order> = decode_batch(&batch).unwrap();
        assert_eq!(orders, vec![Order { id: 1 }, Order { id: 2 }]);
    }

    #[test]
    fn test_decode_batch_fails_on_first_bad_body() {
        let batch = vec![message(r#"{"id":1}"#), message("not json")];
        let result = decode_batch::<Order>(&batch);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_typed_executor_completes_on_ok() {
        let executor = TypedExecutor::new(|orders: Vec<Order>| async move {
            assert_eq!(orders.len(), 1);
            Ok::<(), BoxError>(())
        });

        let batch = vec![message(r#"{"id":7}"#)];
        let outcome = executor.execute(&batch, &CancellationToken::new()).await;
        assert_eq!(outcome, ExecutionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_typed_executor_fails_on_undecodable_batch() {
        let executor =
            TypedExecutor::new(|_orders: Vec<Order>| async move { Ok::<(), BoxError>(()) });

        let batch = vec![message("not json")];
        let outcome = executor.execute(&batch, &CancellationToken::new()).await;
        assert_eq!(outcome, ExecutionOutcome::Failed);
    }

    #[tokio::test]
    async fn test_typed_executor_fails_on_handler_error() {
        let executor =
            TypedExecutor::new(|_orders: Vec<Order>| async move { Err::<(), _>("boom") });

        let batch = vec![message(r#"{"id":7}"#)];
        let outcome = executor.execute(&batch, &CancellationToken::new()).await;
        assert_eq!(outcome, ExecutionOutcome::Failed);
    }

    #[tokio::test]
    async fn test_typed_executor_reports_cancellation() {
        let executor =
            TypedExecutor::new(|_orders: Vec<Order>| async move { Ok::<(), BoxError>(()) });

        let token = CancellationToken::new();
        token.cancel();

        let batch = vec![message(r#"{"id":7}"#)];
        let outcome = executor.execute(&batch, &token).await;
        assert_eq!(outcome, ExecutionOutcome::Cancelled);
    }
}
