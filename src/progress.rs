//! Progress reporting
//!
//! The executor only invokes a [`ProgressCallback`]; turning counts into human-readable
//! lines is the job of [`ProgressTracker`], which logs through `tracing`.

use crate::range::BlockRange;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Snapshot passed to progress callbacks after a chunk reaches a final state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Chunks that have reached a final state (succeeded, or failed with continue-on-error)
    pub completed: usize,
    /// Total chunks in this call
    pub total: usize,
    /// The overall block range being fetched
    pub range: BlockRange,
}

impl ProgressUpdate {
    /// Completion as a percentage in `0.0..=100.0`
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

/// Shared progress callback
///
/// Invoked synchronously from the executor's completion handling, so it should return
/// quickly. A panicking callback is caught and logged.
#[derive(Clone)]
pub struct ProgressCallback(Arc<dyn Fn(ProgressUpdate) + Send + Sync>);

impl ProgressCallback {
    /// Wrap a closure
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the callback, swallowing panics
    pub fn call(&self, update: ProgressUpdate) {
        let f = &self.0;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(update)));
        if outcome.is_err() {
            tracing::warn!(
                completed = update.completed,
                total = update.total,
                "progress callback panicked; ignoring"
            );
        }
    }
}

impl std::fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressCallback(..)")
    }
}

impl<F> From<F> for ProgressCallback
where
    F: Fn(ProgressUpdate) + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

/// Human-readable progress logger for long-running fetches
///
/// Emits a line at most once per `update_interval`, and always when the total is
/// reached. Lines look like `Fetching logs: 5/10 (50.00%) (12s elapsed, 12s remaining)`.
pub struct ProgressTracker {
    label: String,
    total: usize,
    update_interval: Duration,
    state: Mutex<TrackerState>,
    sink: Box<dyn Fn(&str) + Send + Sync>,
}

struct TrackerState {
    started: Instant,
    last_update: Instant,
    completed: usize,
}

impl ProgressTracker {
    /// Create a tracker that logs through `tracing::info!`
    pub fn new(total: usize, label: impl Into<String>, update_interval: Duration) -> Self {
        Self::with_sink(total, label, update_interval, |line| {
            tracing::info!("{line}");
        })
    }

    /// Create a tracker that hands each formatted line to `sink`
    pub fn with_sink<F>(
        total: usize,
        label: impl Into<String>,
        update_interval: Duration,
        sink: F,
    ) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let now = Instant::now();
        Self {
            label: label.into(),
            total,
            update_interval,
            state: Mutex::new(TrackerState {
                started: now,
                last_update: now,
                completed: 0,
            }),
            sink: Box::new(sink),
        }
    }

    /// Record `increment` more completed items, logging if due
    pub fn update(&self, increment: usize, force: bool) {
        let line = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.completed += increment;
            self.line_if_due(&mut state, force)
        };
        if let Some(line) = line {
            (self.sink)(&line);
        }
    }

    /// Set the absolute completed count, logging if due
    pub fn set_completed(&self, completed: usize) {
        let line = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.completed = completed;
            self.line_if_due(&mut state, false)
        };
        if let Some(line) = line {
            (self.sink)(&line);
        }
    }

    /// Mark everything complete and log the total duration
    pub fn complete(&self) {
        // Reaching the total already logged the 100% line
        let remaining = self.total.saturating_sub(self.completed());
        if remaining > 0 {
            self.update(remaining, true);
        }
        let elapsed = self.elapsed();
        (self.sink)(&format!(
            "{} completed in {}",
            self.label,
            format_duration(elapsed)
        ));
    }

    /// Completed items so far
    pub fn completed(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).completed
    }

    /// Progress as a fraction in `0.0..=1.0`
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed() as f64 / self.total as f64
    }

    /// Progress as a percentage
    pub fn progress_percent(&self) -> f64 {
        self.progress() * 100.0
    }

    fn elapsed(&self) -> Duration {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .started
            .elapsed()
    }

    fn line_if_due(&self, state: &mut TrackerState, force: bool) -> Option<String> {
        let now = Instant::now();
        let due = force
            || now.duration_since(state.last_update) >= self.update_interval
            || state.completed >= self.total;
        if !due {
            return None;
        }
        state.last_update = now;

        let percent = if self.total == 0 {
            100.0
        } else {
            state.completed as f64 / self.total as f64 * 100.0
        };
        let elapsed = now.duration_since(state.started);

        let mut line = format!(
            "{}: {}/{} ({:.2}%)",
            self.label, state.completed, self.total, percent
        );
        if state.completed > 0 && elapsed.as_secs_f64() > 0.0 {
            let per_sec = state.completed as f64 / elapsed.as_secs_f64();
            let estimated_total = self.total as f64 / per_sec;
            let remaining = (estimated_total - elapsed.as_secs_f64()).max(0.0);
            line.push_str(&format!(
                " ({} elapsed, {} remaining)",
                format_duration(elapsed),
                format_duration(Duration::from_secs_f64(remaining))
            ));
        }
        Some(line)
    }
}

/// Format a duration as `Ns`, `Nm Ns` or `Nh Nm Ns`
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes == 0 {
        return format!("{seconds}s");
    }
    let hours = minutes / 60;
    let minutes = minutes % 60;
    if hours == 0 {
        return format!("{minutes}m {seconds}s");
    }
    format!("{hours}h {minutes}m {seconds}s")
}
