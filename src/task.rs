//! Per-chunk task lifecycle
//!
//! A [`FetchTask`] pairs a chunk index and range with a re-invocable async operation.
//! [`TaskSlot::run`] drives one task through its retry loop:
//!
//! ```text
//! Pending -> Running -> Succeeded
//!               |  ^
//!               v  |
//!         RetryScheduled
//!               |
//!               v
//!         FailedTerminal
//! ```

use crate::error::{Error, Result};
use crate::governor::ConcurrencyGovernor;
use crate::range::BlockRange;
use crate::retry::RetryPolicy;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Boxed operation invoked once per attempt
pub type TaskOperation<T> = Box<dyn FnMut() -> BoxFuture<'static, Result<T>> + Send>;

/// One unit of work for the executor
pub struct FetchTask<T> {
    index: usize,
    range: BlockRange,
    operation: TaskOperation<T>,
}

impl<T> FetchTask<T> {
    /// Create a task; `operation` is called again on every retry
    pub fn new<F, Fut>(index: usize, range: BlockRange, mut operation: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            index,
            range,
            operation: Box::new(move || Box::pin(operation())),
        }
    }

    /// Position in the ordered chunk sequence
    pub fn index(&self) -> usize {
        self.index
    }

    /// Block range this task fetches
    pub fn range(&self) -> BlockRange {
        self.range
    }
}

impl<T> std::fmt::Debug for FetchTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchTask")
            .field("index", &self.index)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of a [`TaskSlot`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Not yet admitted
    Pending,
    /// Operation in flight (0-based attempt)
    Running {
        /// Current attempt number
        attempt: u32,
    },
    /// Waiting before the next attempt
    RetryScheduled {
        /// Attempt that just failed
        attempt: u32,
        /// Wait before the next attempt
        delay: Duration,
    },
    /// Operation produced a value
    Succeeded,
    /// Retries exhausted
    FailedTerminal,
}

impl TaskState {
    /// Whether the task will not run again
    pub fn is_final(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::FailedTerminal)
    }
}

/// Final result of one task, attributed to the task's range
#[derive(Debug)]
pub enum TaskOutcome<T> {
    /// The operation succeeded
    Success {
        /// Value produced by the operation
        value: T,
        /// Range of the task that produced it
        range: BlockRange,
    },
    /// The operation failed terminally
    Failure {
        /// Last error, wrapped as [`Error::RateLimited`] when rate-limit-flavored
        error: Error,
        /// Range of the task that failed
        range: BlockRange,
    },
}

impl<T> TaskOutcome<T> {
    /// Range of the originating task
    pub fn range(&self) -> BlockRange {
        match self {
            TaskOutcome::Success { range, .. } | TaskOutcome::Failure { range, .. } => *range,
        }
    }

    /// Whether the task succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

/// A task together with its lifecycle state
#[derive(Debug)]
pub struct TaskSlot<T> {
    task: FetchTask<T>,
    state: TaskState,
}

impl<T> TaskSlot<T> {
    /// Wrap a task in the `Pending` state
    pub fn new(task: FetchTask<T>) -> Self {
        Self {
            task,
            state: TaskState::Pending,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Index of the wrapped task
    pub fn index(&self) -> usize {
        self.task.index
    }

    /// Range of the wrapped task
    pub fn range(&self) -> BlockRange {
        self.task.range
    }

    /// Run the retry loop until the task reaches a final state
    ///
    /// Successes clear the governor's rate-limit streak; rate-limited failures that
    /// will be retried add to it. Waits are `tokio::time::sleep`, so only this task
    /// is suspended.
    pub async fn run(
        &mut self,
        policy: &RetryPolicy,
        governor: &Mutex<ConcurrencyGovernor>,
    ) -> TaskOutcome<T> {
        let index = self.task.index;
        let range = self.task.range;
        let mut attempt: u32 = 0;

        loop {
            self.state = TaskState::Running { attempt };

            let error = match (self.task.operation)().await {
                Ok(value) => {
                    governor
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .record_success();
                    self.state = TaskState::Succeeded;
                    if attempt > 0 {
                        tracing::debug!(task = index, %range, attempts = attempt + 1, "task succeeded after retry");
                    }
                    return TaskOutcome::Success { value, range };
                }
                Err(e) => e,
            };

            let decision = policy.decide(&error, attempt);
            if !decision.should_retry {
                self.state = TaskState::FailedTerminal;
                let attempts = attempt + 1;
                tracing::error!(
                    task = index,
                    %range,
                    attempts,
                    error = %error,
                    "task failed after all retries"
                );
                let error = if decision.rate_limited && !matches!(error, Error::RateLimited { .. }) {
                    Error::RateLimited {
                        range,
                        attempts,
                        source: Box::new(error),
                    }
                } else {
                    error
                };
                return TaskOutcome::Failure { error, range };
            }

            let reduced = if decision.rate_limited {
                governor
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_rate_limit_hit()
            } else {
                None
            };

            tracing::warn!(
                task = index,
                %range,
                attempt = attempt + 1,
                max_attempts = policy.max_attempts(),
                delay_ms = decision.delay.as_millis() as u64,
                rate_limited = decision.rate_limited,
                concurrency_reduced = reduced.is_some(),
                error = %error,
                "task failed, retrying"
            );

            self.state = TaskState::RetryScheduled {
                attempt,
                delay: decision.delay,
            };
            tokio::time::sleep(decision.delay).await;
            attempt += 1;
        }
    }
}
