//! Batch listener: the poll/dispatch/settle engine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use super::config::{ConfigError, ListenerConfig};
use crate::executor::{BatchExecutor, ExecutionOutcome};
use crate::queue::{QueueClient, QueueError, QueueMessage};
use crate::timer::{
    CommandError, CommandResult, RandomizedExponentialBackoff, SeriesCommand, SeriesTimer,
    TimerError,
};

/// Listener errors
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Invalid construction parameters
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Queue operation failed while settling a batch
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Lifecycle error from the underlying timer
    #[error(transparent)]
    Timer(#[from] TimerError),
}

/// Polls a queue in adaptive cycles and dispatches each fetched batch to an
/// executor
///
/// Each cycle fetches up to `group_size` messages. An empty poll answers with
/// a randomized exponential backoff wait; a non-empty poll dispatches the
/// batch as a tracked background task and waits only until the number of
/// in-flight batches drains back to the concurrency ceiling
/// (`group_size / 2`). Messages whose executor verdict is failure are
/// dead-lettered once their dequeue count reaches the configured budget,
/// provided a poison queue was supplied; otherwise they redeliver after the
/// visibility timeout.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use groupq::executor::{handler_fn, ExecutionOutcome};
/// use groupq::listener::{BatchListener, ListenerConfig};
/// use groupq::queue::InMemoryQueue;
///
/// let queue = Arc::new(InMemoryQueue::new("orders"));
/// let executor = Arc::new(handler_fn(|batch| async move {
///     // process the batch...
///     ExecutionOutcome::Completed
/// }));
///
/// let listener = BatchListener::new(executor, queue, None, ListenerConfig::default())?;
/// listener.start()?;
/// // ... later
/// listener.stop(Duration::from_secs(30)).await?;
/// # Ok::<(), groupq::listener::ListenerError>(())
/// ```
pub struct BatchListener {
    timer: SeriesTimer,
    core: Arc<ListenerCore>,
}

impl BatchListener {
    /// Create a listener over `queue`, escalating to `poison_queue` when
    /// configured
    ///
    /// Fails fast on a zero group size or inverted polling bounds.
    pub fn new(
        executor: Arc<dyn BatchExecutor>,
        queue: Arc<dyn QueueClient>,
        poison_queue: Option<Arc<dyn QueueClient>>,
        config: ListenerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let backoff = RandomizedExponentialBackoff::new(
            config.effective_min_poll_interval(),
            config.effective_max_poll_interval(),
        )?;

        // Initial value is pre-resolved so the first cycle's re-arm finds
        // nothing left to wake
        let (stop_waiting, _) = watch::channel(true);

        let core = Arc::new(ListenerCore {
            executor,
            queue,
            poison_queue,
            new_batch_threshold: config.group_size / 2,
            config,
            backoff: Mutex::new(backoff),
            found_work: AtomicBool::new(false),
            stop_waiting: Mutex::new(stop_waiting),
            in_flight: Arc::new(tokio::sync::Mutex::new(JoinSet::new())),
        });

        let timer = SeriesTimer::new(
            Arc::clone(&core) as Arc<dyn SeriesCommand>,
            CommandResult::immediate(),
        );

        Ok(Self { timer, core })
    }

    /// Begin polling
    #[instrument(skip(self), fields(queue = %self.core.queue.name()))]
    pub fn start(&self) -> Result<(), ListenerError> {
        self.timer.start()?;
        debug!(
            group_size = self.core.config.group_size,
            new_batch_threshold = self.core.new_batch_threshold,
            "listener started"
        );
        Ok(())
    }

    /// Request cooperative cancellation without blocking
    ///
    /// Already-dispatched batches run to completion; their messages are not
    /// deleted if the executor observes the cancellation.
    pub fn cancel(&self) {
        self.timer.cancel();
    }

    /// Stop polling and wait for all in-flight batches to finish
    ///
    /// The poll loop is joined within `timeout`; outstanding processing tasks
    /// are then joined without a deadline, so no background work survives a
    /// successful return.
    #[instrument(skip(self), fields(queue = %self.core.queue.name()))]
    pub async fn stop(&self, timeout: Duration) -> Result<(), ListenerError> {
        self.timer.cancel();
        self.timer.stop(timeout).await?;

        let mut in_flight = self.core.in_flight.lock().await;
        while let Some(result) = in_flight.join_next().await {
            log_task_outcome(result);
        }

        debug!("listener stopped");
        Ok(())
    }
}

struct ListenerCore {
    executor: Arc<dyn BatchExecutor>,
    queue: Arc<dyn QueueClient>,
    poison_queue: Option<Arc<dyn QueueClient>>,
    config: ListenerConfig,
    /// In-flight ceiling: half the group size
    new_batch_threshold: usize,
    backoff: Mutex<RandomizedExponentialBackoff>,
    /// Whether any batch was dispatched since the last backoff computation
    found_work: AtomicBool,
    /// Re-armed every cycle; waking it pre-empts the previous cycle's wait
    stop_waiting: Mutex<watch::Sender<bool>>,
    /// Mutated only from the poll loop and `stop`
    in_flight: Arc<tokio::sync::Mutex<JoinSet<Result<(), ListenerError>>>>,
}

#[async_trait]
impl SeriesCommand for ListenerCore {
    async fn execute(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<CommandResult, CommandError> {
        let stop_waiting = self.rearm_stop_waiting();

        let batch = match self
            .queue
            .fetch_messages(
                self.config.group_size,
                self.config.visibility_timeout,
                cancellation,
            )
            .await
        {
            Ok(batch) => batch,
            Err(error) => {
                if cancellation.is_cancelled() {
                    return Err(CommandError::Cancelled);
                }
                // Treated like an empty poll: the queue's redelivery
                // semantics make a lost cycle safe
                warn!(queue = self.queue.name(), error = %error, "fetch failed, backing off");
                return Ok(self.backoff_result(stop_waiting));
            }
        };

        if cancellation.is_cancelled() {
            // Fetched messages are abandoned; they become visible again
            // after the visibility timeout
            return Err(CommandError::Cancelled);
        }

        if batch.is_empty() {
            return Ok(self.backoff_result(stop_waiting));
        }

        debug!(
            queue = self.queue.name(),
            count = batch.len(),
            "dispatching batch"
        );

        let task = process_batch(
            Arc::clone(&self.executor),
            Arc::clone(&self.queue),
            self.poison_queue.clone(),
            self.config.max_dequeue_count,
            batch,
            cancellation.clone(),
        );
        self.in_flight.lock().await.spawn(task);
        self.found_work.store(true, Ordering::SeqCst);

        Ok(self.succeeded_result())
    }
}

impl ListenerCore {
    /// Wake any wait still pending from the previous cycle and install a
    /// fresh signal for this one
    fn rearm_stop_waiting(&self) -> watch::Receiver<bool> {
        let (sender, receiver) = watch::channel(false);
        let previous = std::mem::replace(&mut *self.stop_waiting.lock(), sender);
        let _ = previous.send(true);
        receiver
    }

    /// Backoff result: wait out the computed delay unless the stop-waiting
    /// signal fires first
    fn backoff_result(&self, mut stop_waiting: watch::Receiver<bool>) -> CommandResult {
        let found_work = self.found_work.swap(false, Ordering::SeqCst);
        let delay = self.backoff.lock().next_delay(found_work);
        debug!(delay_ms = delay.as_millis() as u64, "no work, backing off");

        CommandResult::new(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_waiting.changed() => {}
            }
        })
    }

    /// Succeeded result: drain completed tasks until the in-flight count is
    /// at or below the ceiling, then poll again immediately
    fn succeeded_result(&self) -> CommandResult {
        let in_flight = Arc::clone(&self.in_flight);
        let threshold = self.new_batch_threshold;

        CommandResult::new(async move {
            let mut tasks = in_flight.lock().await;
            while tasks.len() > threshold {
                match tasks.join_next().await {
                    Some(result) => log_task_outcome(result),
                    None => break,
                }
            }
        })
    }
}

/// Body of one processing task
///
/// Runs independently of the poll loop. The task's slot in the in-flight set
/// is reclaimed by the drain step regardless of how it finishes.
async fn process_batch(
    executor: Arc<dyn BatchExecutor>,
    queue: Arc<dyn QueueClient>,
    poison_queue: Option<Arc<dyn QueueClient>>,
    max_dequeue_count: u32,
    batch: Vec<QueueMessage>,
    cancellation: CancellationToken,
) -> Result<(), ListenerError> {
    // Cancellation does not preempt a started batch: the executor observes
    // the token and reports Cancelled itself
    let outcome = executor.execute(&batch, &cancellation).await;

    match outcome {
        ExecutionOutcome::Completed => {
            for message in &batch {
                queue.delete_message(message, &cancellation).await?;
            }
            debug!(queue = queue.name(), count = batch.len(), "batch settled");
        }
        ExecutionOutcome::Failed => {
            if let Some(poison_queue) = &poison_queue {
                for message in &batch {
                    if message.dequeue_count >= max_dequeue_count {
                        warn!(
                            queue = queue.name(),
                            message_id = %message.id,
                            dequeue_count = message.dequeue_count,
                            "delivery budget exhausted, moving message to poison queue"
                        );
                        poison_queue.ensure_exists(&cancellation).await?;
                        poison_queue
                            .enqueue_message(&message.body, &cancellation)
                            .await?;
                        queue.delete_message(message, &cancellation).await?;
                    }
                }
            }
            // Messages under the budget (or without a poison queue) are left
            // to redeliver after the visibility timeout
        }
        ExecutionOutcome::Cancelled => {
            debug!(queue = queue.name(), "batch processing aborted, messages will redeliver");
        }
    }

    Ok(())
}

fn log_task_outcome(result: Result<Result<(), ListenerError>, JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(error)) => error!(error = %error, "batch processing task failed"),
        Err(join_error) => error!(error = %join_error, "batch processing task panicked"),
    }
}
