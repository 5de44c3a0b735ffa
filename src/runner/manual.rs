//! Single-queue runner drained by its owner.

use super::stats::RunnerStats;
use super::{Disposal, PanicHandler, Runner, RunnerHandle, RunnerId, StatsSnapshot};
use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use crate::registry;
use crate::task::{CompletionFlag, PausedTask, Task};
use crate::util::Backoff;
use crossbeam_deque::{Injector, Steal};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ManualQueue {
    id: RunnerId,
    config: RunnerConfig,
    disposed: AtomicBool,
    queue: Injector<PausedTask>,
    panic_handler: PanicHandler,
    stats: RunnerStats,
}

impl ManualQueue {
    fn run_once(&self) -> bool {
        loop {
            match self.queue.steal() {
                Steal::Success(task) => {
                    task.run();
                    self.stats.record_executed();
                    return true;
                }
                Steal::Empty => return false,
                Steal::Retry => continue,
            }
        }
    }
}

impl Runner for ManualQueue {
    fn id(&self) -> RunnerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn submit(&self, task: PausedTask) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            let err = Error::Disposed(self.config.name.clone());
            self.stats.record_rejected();
            task.reject(err.clone());
            return Err(err);
        }

        self.queue.push(task);
        self.stats.record_scheduled();
        Ok(())
    }

    fn wait(&self, flag: &CompletionFlag) {
        if registry::current_runner_id() != Some(self.id) {
            // someone else drains this queue
            flag.wait(self.config.wait_strategy);
            return;
        }

        let mut backoff = Backoff::new();
        while !flag.is_set() {
            if self.run_once() {
                backoff.reset();
            } else {
                backoff.snooze();
            }
        }
    }

    fn scheduled_task_count(&self) -> usize {
        self.queue.len()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) -> Disposal {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Disposal::AlreadyDisposed;
        }
        tracing::debug!(
            runner = %self.config.name,
            queued = self.queue.len(),
            "disposed manual runner"
        );
        Disposal::Disposed
    }

    fn panic_handler(&self) -> &PanicHandler {
        &self.panic_handler
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats
            .snapshot(self.queue.len(), self.panic_handler.panic_count())
    }
}

/// Runner with a FIFO queue that runs only when someone drives it.
///
/// Work runs when the owner calls [`run_once`](ManualRunner::run_once),
/// [`run_until_idle`](ManualRunner::run_until_idle) or
/// [`block_on`](ManualRunner::block_on), or when a thread that has this
/// runner registered awaits a task. Any other thread awaiting one of its
/// tasks just waits.
///
/// ```
/// use taskweave::ManualRunner;
///
/// let runner = ManualRunner::new();
/// let task = runner.handle().schedule(|| Ok(2)).unwrap().then(|x| Ok(x * 21));
/// assert_eq!(runner.block_on(&task).unwrap(), 42);
/// ```
#[derive(Clone)]
pub struct ManualRunner {
    shared: Arc<ManualQueue>,
    handle: RunnerHandle,
}

impl ManualRunner {
    /// A runner named `manual` with default settings.
    pub fn new() -> Self {
        Self::build(RunnerConfig::named("manual"))
    }

    /// A runner with `config`, validated first.
    pub fn with_config(config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RunnerConfig) -> Self {
        let shared = Arc::new(ManualQueue {
            id: RunnerId::next(),
            panic_handler: PanicHandler::new(config.panic_strategy),
            config,
            disposed: AtomicBool::new(false),
            queue: Injector::new(),
            stats: RunnerStats::default(),
        });
        let handle = RunnerHandle::from(shared.clone());
        tracing::debug!(runner = %shared.config.name, id = %shared.id, "created manual runner");

        Self { shared, handle }
    }

    /// Handle used to schedule work on this runner.
    pub fn handle(&self) -> RunnerHandle {
        self.handle.clone()
    }

    /// Tasks waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Runs the oldest queued task. Returns `false` if the queue was empty.
    pub fn run_once(&self) -> bool {
        registry::with_runner(self.handle.clone(), || self.shared.run_once())
    }

    /// Runs queued tasks, including ones they queue, until the queue is
    /// empty. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        registry::with_runner(self.handle.clone(), || {
            let mut ran = 0;
            while self.shared.run_once() {
                ran += 1;
            }
            ran
        })
    }

    /// Drives this runner on the calling thread until `task` completes.
    pub fn block_on<T>(&self, task: &Task<T>) -> Result<T>
    where
        T: Clone + Send + 'static,
    {
        registry::with_runner(self.handle.clone(), || task.join())
    }
}

impl Default for ManualRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualRunner")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("pending", &self.shared.queue.len())
            .field("disposed", &self.shared.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_fifo_order() {
        let runner = ManualRunner::new();
        let handle = runner.handle();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            handle
                .schedule(move || {
                    order.lock().push(i);
                    Ok(())
                })
                .unwrap();
        }

        assert_eq!(handle.scheduled_task_count(), 5);
        assert_eq!(runner.run_until_idle(), 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(handle.scheduled_task_count(), 0);
    }

    #[test]
    fn test_nothing_runs_until_driven() {
        let runner = ManualRunner::new();
        let task = runner.handle().schedule(|| Ok(1)).unwrap();

        assert!(!task.is_completed());
        assert!(runner.run_once());
        assert!(task.is_completed());
        assert!(!runner.run_once());
    }

    #[test]
    fn test_schedule_after_dispose_fails() {
        let runner = ManualRunner::new();
        let handle = runner.handle();

        assert_eq!(handle.dispose(), Disposal::Disposed);
        assert!(handle.is_disposed());

        let err = handle.schedule(|| Ok(1)).unwrap_err();
        assert_eq!(err, Error::Disposed("manual".to_string()));
        assert_eq!(handle.stats().rejected, 1);
    }

    #[test]
    fn test_dispose_twice() {
        let runner = ManualRunner::new();

        assert_eq!(runner.handle().dispose(), Disposal::Disposed);
        assert_eq!(runner.handle().dispose(), Disposal::AlreadyDisposed);
    }

    #[test]
    fn test_continuation_on_disposed_runner_settles_with_error() {
        let runner = ManualRunner::new();
        let handle = runner.handle();

        let first = handle.schedule(|| Ok(1)).unwrap();
        let second = first.then(|x| Ok(x + 1));
        handle.dispose();

        // already queued work still drains
        runner.run_until_idle();
        assert_eq!(first.try_result(), Some(Ok(1)));
        assert_eq!(
            second.try_result(),
            Some(Err(Error::Disposed("manual".to_string())))
        );
    }

    #[test]
    fn test_tasks_see_runner_as_current() {
        let runner = ManualRunner::new();
        let handle = runner.handle();

        let task = handle
            .schedule(|| registry::current_runner().map(|r| r.id()))
            .unwrap();

        assert_eq!(runner.block_on(&task).unwrap(), handle.id());
    }

    #[test]
    fn test_nested_schedule_from_task() {
        let runner = ManualRunner::new();
        let handle = runner.handle();

        let outer = handle
            .schedule(|| {
                let current = registry::current_runner()?;
                let inner = current.schedule(|| Ok(5))?;
                inner.join()
            })
            .unwrap();

        assert_eq!(runner.block_on(&outer).unwrap(), 5);
    }

    #[test]
    fn test_stats() {
        let runner = ManualRunner::new();
        let handle = runner.handle();

        handle.schedule(|| Ok(())).unwrap();
        handle.schedule(|| Ok(())).unwrap();
        runner.run_once();

        let stats = handle.stats();
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.executed, 1);
        assert_eq!(stats.pending, 1);
    }

    #[test]
    fn test_invalid_config() {
        let config = RunnerConfig::named("");
        assert!(ManualRunner::with_config(config).is_err());
    }
}
