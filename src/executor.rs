//! Bounded parallel execution with order-preserving collection
//!
//! [`ParallelExecutor`] spawns one tokio task per [`FetchTask`], admitting new tasks only
//! while fewer than the governor's *current* limit are in flight. The driver loop is
//! the single owner of the results map, failure list and completed count; spawned
//! tasks only report their [`TaskOutcome`] back through their join handle.
//!
//! With `continue_on_error` disabled, the first terminal failure (by completion order,
//! so not deterministic across runs) is returned as [`Error::Execution`]. Tasks that are
//! already running are detached and finish in the background; nothing new is admitted.

use crate::config::FetcherConfig;
use crate::error::{Error, Result};
use crate::governor::ConcurrencyGovernor;
use crate::range::BlockRange;
use crate::retry::RetryPolicy;
use crate::task::{FetchTask, TaskOutcome, TaskSlot};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

/// Called with `(completed, total)` after each task reaches a final state
pub type ProgressHook = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Options for a [`ParallelExecutor`]
#[derive(Clone)]
pub struct ExecutorOptions {
    /// Initial concurrency limit
    pub concurrency: usize,
    /// Keep going after terminal failures
    pub continue_on_error: bool,
    /// Retry policy applied to every task
    pub retry_policy: RetryPolicy,
    /// Optional progress hook
    pub on_progress: Option<ProgressHook>,
}

impl ExecutorOptions {
    /// Derive options from a fetcher configuration (without a progress hook)
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            continue_on_error: config.continue_on_error,
            retry_policy: RetryPolicy::from_config(config),
            on_progress: None,
        }
    }
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self::from_config(&FetcherConfig::default())
    }
}

impl std::fmt::Debug for ExecutorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorOptions")
            .field("concurrency", &self.concurrency)
            .field("continue_on_error", &self.continue_on_error)
            .field("retry_policy", &self.retry_policy)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// A task that failed terminally
#[derive(Debug)]
pub struct ChunkFailure {
    /// Index of the failed task
    pub index: usize,
    /// Block range of the failed task
    pub range: BlockRange,
    /// The terminal error
    pub error: Error,
}

/// Everything an execution produced
#[derive(Debug)]
pub struct ExecutionReport<T> {
    /// Successful values, in task index order
    pub results: Vec<T>,
    /// Terminal failures, in completion order
    pub failures: Vec<ChunkFailure>,
    /// Number of tasks submitted
    pub total: usize,
}

impl<T> ExecutionReport<T> {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            failures: Vec::new(),
            total: 0,
        }
    }

    /// Whether every task succeeded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs [`FetchTask`]s concurrently under an adaptive limit
///
/// Every call gets its own governor starting at the initial limit. The executor keeps
/// a snapshot of the latest run's governor, readable through
/// [`ParallelExecutor::governor`]; tasks detached by a fail-fast return cannot touch it.
pub struct ParallelExecutor {
    options: ExecutorOptions,
    last_governor: Mutex<ConcurrencyGovernor>,
}

impl ParallelExecutor {
    /// Create an executor
    pub fn new(options: ExecutorOptions) -> Self {
        let governor = ConcurrencyGovernor::new(options.concurrency);
        Self {
            options,
            last_governor: Mutex::new(governor),
        }
    }

    /// Create an executor from a fetcher configuration
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self::new(ExecutorOptions::from_config(config))
    }

    /// Set the progress hook
    #[must_use]
    pub fn with_progress<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.options.on_progress = Some(Arc::new(hook));
        self
    }

    /// Options this executor was built with
    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Admission limit of the current or most recent run
    pub fn current_limit(&self) -> usize {
        lock(&self.last_governor).current_limit()
    }

    /// Snapshot of the current or most recent run's governor
    pub fn governor(&self) -> ConcurrencyGovernor {
        lock(&self.last_governor).clone()
    }

    /// Execute `tasks`, returning successful values in index order
    ///
    /// Each call starts at the configured concurrency, whatever earlier calls did to
    /// their limit.
    ///
    /// # Errors
    ///
    /// With `continue_on_error` disabled, returns [`Error::Execution`] wrapping the
    /// first terminal failure. With it enabled this only fails if nothing could be
    /// run at all, which cannot happen; failed tasks are simply absent from the output.
    pub async fn execute<T>(&self, tasks: Vec<FetchTask<T>>) -> Result<Vec<T>>
    where
        T: Send + 'static,
    {
        self.execute_with_report(tasks)
            .await
            .map(|report| report.results)
    }

    /// Execute `tasks`, also returning the terminal failures
    ///
    /// # Errors
    ///
    /// See [`ParallelExecutor::execute`].
    pub async fn execute_with_report<T>(
        &self,
        tasks: Vec<FetchTask<T>>,
    ) -> Result<ExecutionReport<T>>
    where
        T: Send + 'static,
    {
        let total = tasks.len();
        if total == 0 {
            return Ok(ExecutionReport::empty());
        }

        let governor = Arc::new(Mutex::new(ConcurrencyGovernor::new(
            self.options.concurrency,
        )));

        let mut queue = tasks.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut results = BTreeMap::new();
        let mut failures = Vec::new();
        let mut completed = 0;

        loop {
            // Re-read the limit on every admission round; a reduction never touches
            // tasks that are already running.
            let limit = self.publish(&governor);
            while in_flight.len() < limit {
                let Some(task) = queue.next() else { break };
                tracing::debug!(
                    task = task.index(),
                    range = %task.range(),
                    in_flight = in_flight.len() + 1,
                    limit,
                    "admitting task"
                );
                in_flight.push(self.spawn_slot(TaskSlot::new(task), &governor));
            }

            let Some((index, range, outcome)) = in_flight.next().await else {
                break;
            };

            match outcome {
                TaskOutcome::Success { value, .. } => {
                    results.insert(index, value);
                }
                TaskOutcome::Failure { error, .. } => {
                    if !self.options.continue_on_error {
                        tracing::error!(
                            task = index,
                            %range,
                            error = %error,
                            in_flight = in_flight.len(),
                            "parallel execution failed"
                        );
                        // Dropping the join handles detaches the remaining tasks
                        self.publish(&governor);
                        return Err(Error::Execution {
                            failed: failures.len() + 1,
                            total,
                            first: Box::new(error),
                        });
                    }
                    failures.push(ChunkFailure {
                        index,
                        range,
                        error,
                    });
                }
            }

            completed += 1;
            self.report_progress(completed, total);
        }

        self.publish(&governor);
        if !failures.is_empty() {
            tracing::warn!(
                failed = failures.len(),
                total,
                "parallel execution completed with errors"
            );
        }

        Ok(ExecutionReport {
            results: results.into_values().collect(),
            failures,
            total,
        })
    }

    fn spawn_slot<T>(
        &self,
        mut slot: TaskSlot<T>,
        governor: &Arc<Mutex<ConcurrencyGovernor>>,
    ) -> impl Future<Output = (usize, BlockRange, TaskOutcome<T>)> + use<T>
    where
        T: Send + 'static,
    {
        let index = slot.index();
        let range = slot.range();
        let policy = self.options.retry_policy.clone();
        let governor = Arc::clone(governor);

        let handle = tokio::spawn(async move { slot.run(&policy, &governor).await });

        async move {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error = if e.is_panic() {
                        Error::TaskPanicked { index }
                    } else {
                        Error::Other(format!("task {index} was cancelled"))
                    };
                    TaskOutcome::Failure { error, range }
                }
            };
            (index, range, outcome)
        }
    }

    fn report_progress(&self, completed: usize, total: usize) {
        let Some(hook) = &self.options.on_progress else {
            return;
        };
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(completed, total)));
        if outcome.is_err() {
            tracing::warn!(completed, total, "progress hook panicked; ignoring");
        }
    }

    /// Copy the run's governor into the executor's snapshot, returning its limit
    fn publish(&self, governor: &Mutex<ConcurrencyGovernor>) -> usize {
        let state = lock(governor).clone();
        let limit = state.current_limit();
        *lock(&self.last_governor) = state;
        limit
    }
}

fn lock(governor: &Mutex<ConcurrencyGovernor>) -> MutexGuard<'_, ConcurrencyGovernor> {
    governor.lock().unwrap_or_else(|e| e.into_inner())
}
