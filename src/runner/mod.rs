//! Runners: where paused tasks get executed.
//!
//! Two strategies ship with the crate. [`ManualRunner`] keeps a FIFO queue
//! that its owner drains, or that gets drained while the owner awaits.
//! [`ParallelRunner`] starts one OS thread per task. Both are used through
//! a cheap, cloneable [`RunnerHandle`].

pub mod manual;
pub mod panic_handler;
pub mod parallel;
pub mod stats;

pub use manual::ManualRunner;
pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
pub use parallel::ParallelRunner;
pub use stats::StatsSnapshot;

use crate::error::Result;
use crate::task::{CompletionFlag, PausedTask, Task};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static RUNNER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunnerId(u64);

impl RunnerId {
    pub(crate) fn next() -> Self {
        RunnerId(RUNNER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runner-{}", self.0)
    }
}

/// Result of [`RunnerHandle::dispose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    /// This call disposed the runner.
    Disposed,
    /// The runner had been disposed before.
    AlreadyDisposed,
}

/// A scheduling strategy.
///
/// Implementations must run every accepted [`PausedTask`] exactly once via
/// [`PausedTask::run`]. A task that is refused must be settled with
/// [`PausedTask::reject`] before `submit` returns the error.
pub trait Runner: Send + Sync + 'static {
    /// Identity used for handle equality and registry lookups.
    fn id(&self) -> RunnerId;

    /// Name from the runner config.
    fn name(&self) -> &str;

    /// Accepts a task for execution.
    fn submit(&self, task: PausedTask) -> Result<()>;

    /// Blocks the calling thread until `flag` is set, helping with queued
    /// work where the strategy allows it.
    fn wait(&self, flag: &CompletionFlag);

    /// Tasks accepted but not yet run.
    fn scheduled_task_count(&self) -> usize;

    /// Whether [`dispose`](Runner::dispose) was called.
    fn is_disposed(&self) -> bool;

    /// Stops accepting new work. Idempotent.
    fn dispose(&self) -> Disposal;

    /// Guards every work item run on this runner.
    fn panic_handler(&self) -> &PanicHandler;

    /// Current counters.
    fn stats(&self) -> StatsSnapshot;
}

/// Shared handle to a runner.
///
/// Handles compare equal when they point at the same runner.
#[derive(Clone)]
pub struct RunnerHandle {
    inner: Arc<dyn Runner>,
}

impl RunnerHandle {
    /// Wraps a custom [`Runner`] implementation.
    pub fn new<R: Runner>(runner: R) -> Self {
        Self {
            inner: Arc::new(runner),
        }
    }

    /// Schedules `f` and returns a handle to its task.
    ///
    /// Fails with [`Error::Disposed`](crate::Error::Disposed) once the
    /// runner has been disposed.
    pub fn schedule<T, F>(&self, f: F) -> Result<Task<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let task = Task::spawn(self, None, f)?;
        tracing::debug!(runner = %self.name(), task = %task.id(), "scheduled task");
        Ok(task)
    }

    /// [`schedule`](RunnerHandle::schedule) with a label on the task.
    pub fn schedule_named<T, F, S>(&self, label: S, f: F) -> Result<Task<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
        S: Into<String>,
    {
        let task = Task::spawn(self, Some(label.into()), f)?;
        tracing::debug!(
            runner = %self.name(),
            task = %task.id(),
            label = task.label().unwrap_or(""),
            "scheduled task"
        );
        Ok(task)
    }

    /// See [`Runner::id`].
    pub fn id(&self) -> RunnerId {
        self.inner.id()
    }

    /// See [`Runner::name`].
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// See [`Runner::submit`].
    pub fn submit(&self, task: PausedTask) -> Result<()> {
        self.inner.submit(task)
    }

    /// See [`Runner::wait`].
    pub fn wait(&self, flag: &CompletionFlag) {
        self.inner.wait(flag)
    }

    /// See [`Runner::scheduled_task_count`].
    pub fn scheduled_task_count(&self) -> usize {
        self.inner.scheduled_task_count()
    }

    /// See [`Runner::is_disposed`].
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// See [`Runner::dispose`].
    pub fn dispose(&self) -> Disposal {
        self.inner.dispose()
    }

    /// See [`Runner::panic_handler`].
    pub fn panic_handler(&self) -> &PanicHandler {
        self.inner.panic_handler()
    }

    /// See [`Runner::stats`].
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats()
    }
}

impl<R: Runner> From<Arc<R>> for RunnerHandle {
    fn from(runner: Arc<R>) -> Self {
        Self { inner: runner }
    }
}

impl PartialEq for RunnerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for RunnerHandle {}

impl fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
