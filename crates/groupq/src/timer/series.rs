//! Recurring command scheduler
//!
//! Runs a [`SeriesCommand`] repeatedly. Each run returns the wait future that
//! gates the next run, so the command itself decides the pacing (fixed delay,
//! backoff, drain-until-capacity, ...). Cancellation is cooperative: the loop
//! races every wait against a [`CancellationToken`] and exits as soon as the
//! token fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

/// Result of one command run: how long to wait before the next run
///
/// The wait is an arbitrary future rather than a plain duration so commands
/// can gate the next run on events other than the clock (e.g. in-flight work
/// draining below a threshold).
pub struct CommandResult {
    wait: BoxFuture<'static, ()>,
}

impl CommandResult {
    /// Gate the next run on an arbitrary future
    pub fn new<F>(wait: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { wait: wait.boxed() }
    }

    /// Run again as soon as the loop is scheduled
    pub fn immediate() -> Self {
        Self::new(async {})
    }

    /// Run again after a fixed delay
    pub fn after(delay: Duration) -> Self {
        Self::new(tokio::time::sleep(delay))
    }
}

impl std::fmt::Debug for CommandResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandResult").finish_non_exhaustive()
    }
}

/// Error from a single command run
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command observed cancellation; the loop exits as a normal shutdown
    #[error("command observed cancellation")]
    Cancelled,

    /// The command failed; fatal to the run loop, surfaced by `stop`
    #[error("command failed: {0}")]
    Fatal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A unit of work the timer runs repeatedly
#[async_trait]
pub trait SeriesCommand: Send + Sync + 'static {
    /// Run once and return the wait gating the next run
    async fn execute(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<CommandResult, CommandError>;
}

/// Timer lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// The timer has already been started; it cannot be restarted
    #[error("the timer has already been started; it cannot be restarted")]
    AlreadyStarted,

    /// The timer has not yet been started
    #[error("the timer has not yet been started")]
    NotStarted,

    /// The timer has already been stopped
    #[error("the timer has already been stopped")]
    AlreadyStopped,

    /// The run loop did not exit within the stop timeout
    #[error("timed out waiting for the run loop to stop")]
    StopTimeout,

    /// The run loop terminated on a fatal command error
    #[error("run loop terminated: {0}")]
    Command(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The run loop task panicked
    #[error("run loop task panicked: {0}")]
    RunLoopPanicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    NotStarted,
    Started,
    Stopped,
}

/// Runs a [`SeriesCommand`] in a self-scheduling loop
///
/// Lifecycle is one-way: not-started, started, stopped. Starting twice or
/// stopping before starting is a caller error, not silently ignored. Dropping
/// the timer cancels the loop without joining it; use [`SeriesTimer::stop`]
/// for a deterministic join.
pub struct SeriesTimer {
    command: Arc<dyn SeriesCommand>,
    cancellation: CancellationToken,
    state: Mutex<TimerState>,
    initial_wait: Mutex<Option<CommandResult>>,
    run_handle: Mutex<Option<JoinHandle<Result<(), TimerError>>>>,
}

impl SeriesTimer {
    /// Create a timer that will run `command` after `initial_wait`
    pub fn new(command: Arc<dyn SeriesCommand>, initial_wait: CommandResult) -> Self {
        Self {
            command,
            cancellation: CancellationToken::new(),
            state: Mutex::new(TimerState::NotStarted),
            initial_wait: Mutex::new(Some(initial_wait)),
            run_handle: Mutex::new(None),
        }
    }

    /// Begin the run loop
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<(), TimerError> {
        let mut state = self.state.lock();
        if *state != TimerState::NotStarted {
            return Err(TimerError::AlreadyStarted);
        }

        let initial_wait = self
            .initial_wait
            .lock()
            .take()
            .expect("initial wait consumed only by start");

        let command = Arc::clone(&self.command);
        let cancellation = self.cancellation.clone();
        let handle = tokio::spawn(Self::run(command, cancellation, initial_wait));

        *self.run_handle.lock() = Some(handle);
        *state = TimerState::Started;
        Ok(())
    }

    /// Request cooperative cancellation without blocking
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// The cancellation token observed by the run loop
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancel and wait for the run loop to exit
    ///
    /// Fails with a lifecycle error if the timer was never started or has
    /// already been stopped. A fatal command error that terminated the loop is
    /// surfaced here. The timer is marked stopped even when the join times
    /// out; the loop itself still observes cancellation and unwinds on its
    /// own.
    #[instrument(skip(self))]
    pub async fn stop(&self, timeout: Duration) -> Result<(), TimerError> {
        let handle = {
            let state = self.state.lock();
            match *state {
                TimerState::NotStarted => return Err(TimerError::NotStarted),
                TimerState::Stopped => return Err(TimerError::AlreadyStopped),
                TimerState::Started => {}
            }
            // A concurrent stop may have taken the handle already
            match self.run_handle.lock().take() {
                Some(handle) => handle,
                None => return Err(TimerError::AlreadyStopped),
            }
        };

        self.cancellation.cancel();

        let result = match tokio::time::timeout(timeout, handle).await {
            Err(_) => Err(TimerError::StopTimeout),
            Ok(Err(join_error)) => Err(TimerError::RunLoopPanicked(join_error.to_string())),
            Ok(Ok(loop_result)) => loop_result,
        };

        *self.state.lock() = TimerState::Stopped;
        debug!("timer stopped");
        result
    }

    async fn run(
        command: Arc<dyn SeriesCommand>,
        cancellation: CancellationToken,
        initial_wait: CommandResult,
    ) -> Result<(), TimerError> {
        let mut wait = initial_wait.wait;

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = &mut wait => {}
            }

            if cancellation.is_cancelled() {
                break;
            }

            match command.execute(&cancellation).await {
                Ok(result) => wait = result.wait,
                Err(CommandError::Cancelled) => break,
                Err(CommandError::Fatal(source)) => {
                    error!(error = %source, "command failed; terminating run loop");
                    return Err(TimerError::Command(source));
                }
            }
        }

        debug!("run loop exited");
        Ok(())
    }
}

impl Drop for SeriesTimer {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingCommand {
        runs: AtomicU32,
        delay: Duration,
    }

    impl CountingCommand {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU32::new(0),
                delay,
            })
        }

        fn runs(&self) -> u32 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SeriesCommand for CountingCommand {
        async fn execute(
            &self,
            _cancellation: &CancellationToken,
        ) -> Result<CommandResult, CommandError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(CommandResult::after(self.delay))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_runs_repeatedly() {
        let command = CountingCommand::new(Duration::from_millis(10));
        let timer = SeriesTimer::new(command.clone(), CommandResult::immediate());

        timer.start().unwrap();
        tokio::time::sleep(Duration::from_millis(105)).await;

        timer.stop(Duration::from_secs(1)).await.unwrap();
        assert!(command.runs() >= 2, "expected repeated runs");
    }

    #[tokio::test]
    async fn test_start_twice_is_a_caller_error() {
        let command = CountingCommand::new(Duration::from_secs(60));
        let timer = SeriesTimer::new(command, CommandResult::immediate());

        timer.start().unwrap();
        assert!(matches!(timer.start(), Err(TimerError::AlreadyStarted)));

        timer.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start_is_a_caller_error() {
        let command = CountingCommand::new(Duration::from_secs(60));
        let timer = SeriesTimer::new(command, CommandResult::immediate());

        let result = timer.stop(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TimerError::NotStarted)));
    }

    #[tokio::test]
    async fn test_stop_twice_is_a_caller_error() {
        let command = CountingCommand::new(Duration::from_secs(60));
        let timer = SeriesTimer::new(command, CommandResult::immediate());

        timer.start().unwrap();
        timer.stop(Duration::from_secs(1)).await.unwrap();

        let result = timer.stop(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TimerError::AlreadyStopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_halts_the_loop() {
        let command = CountingCommand::new(Duration::from_millis(10));
        let timer = SeriesTimer::new(command.clone(), CommandResult::immediate());

        timer.start().unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        timer.cancel();

        let runs_at_cancel = command.runs();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(command.runs(), runs_at_cancel);

        timer.stop(Duration::from_secs(1)).await.unwrap();
    }

    struct FailingCommand;

    #[async_trait]
    impl SeriesCommand for FailingCommand {
        async fn execute(
            &self,
            _cancellation: &CancellationToken,
        ) -> Result<CommandResult, CommandError> {
            Err(CommandError::Fatal("disk on fire".into()))
        }
    }

    #[tokio::test]
    async fn test_fatal_command_error_surfaces_on_stop() {
        let timer = SeriesTimer::new(Arc::new(FailingCommand), CommandResult::immediate());

        timer.start().unwrap();
        tokio::task::yield_now().await;

        let result = timer.stop(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TimerError::Command(_))));
    }

    struct CancelReportingCommand;

    #[async_trait]
    impl SeriesCommand for CancelReportingCommand {
        async fn execute(
            &self,
            _cancellation: &CancellationToken,
        ) -> Result<CommandResult, CommandError> {
            Err(CommandError::Cancelled)
        }
    }

    #[tokio::test]
    async fn test_cancellation_from_command_is_a_clean_shutdown() {
        let timer = SeriesTimer::new(Arc::new(CancelReportingCommand), CommandResult::immediate());

        timer.start().unwrap();
        tokio::task::yield_now().await;

        timer.stop(Duration::from_secs(1)).await.unwrap();
    }

    struct StuckCommand;

    #[async_trait]
    impl SeriesCommand for StuckCommand {
        async fn execute(
            &self,
            _cancellation: &CancellationToken,
        ) -> Result<CommandResult, CommandError> {
            // Ignores the token: the loop cannot observe cancellation while
            // this is pending
            std::future::pending::<()>().await;
            Ok(CommandResult::immediate())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_times_out_on_a_stuck_command() {
        let timer = SeriesTimer::new(Arc::new(StuckCommand), CommandResult::immediate());

        timer.start().unwrap();
        tokio::task::yield_now().await;

        let result = timer.stop(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TimerError::StopTimeout)));
    }
}
