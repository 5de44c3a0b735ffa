//! Thread-per-task runner.

use super::stats::RunnerStats;
use super::{Disposal, PanicHandler, Runner, RunnerHandle, RunnerId, StatsSnapshot};
use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use crate::registry;
use crate::task::{in_work_item, CompletionFlag, PausedTask, WorkItemScope};
use crate::util::Backoff;
use crossbeam_deque::Worker as LocalQueue;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

// Continuations released on a worker thread by the completion of the task it
// runs, and bound to the same runner, run on that thread after the task
// instead of getting a thread of their own.
struct Cascade {
    runner: RunnerId,
    queue: LocalQueue<PausedTask>,
}

thread_local! {
    static CASCADE: RefCell<Option<Cascade>> = const { RefCell::new(None) };
}

fn cascade_push(runner: RunnerId, task: PausedTask) -> std::result::Result<(), PausedTask> {
    CASCADE.with(|slot| match slot.borrow().as_ref() {
        Some(cascade) if cascade.runner == runner => {
            cascade.queue.push(task);
            Ok(())
        }
        _ => Err(task),
    })
}

fn cascade_pop() -> Option<PausedTask> {
    CASCADE.with(|slot| slot.borrow().as_ref().and_then(|cascade| cascade.queue.pop()))
}

fn is_worker_of(runner: RunnerId) -> bool {
    CASCADE.with(|slot| matches!(slot.borrow().as_ref(), Some(c) if c.runner == runner))
}

/// Installs a cascade queue for the worker's lifetime.
struct CascadeScope {
    tally: Arc<Tally>,
    previous: Option<Cascade>,
}

impl CascadeScope {
    fn enter(runner: RunnerId, tally: Arc<Tally>) -> Self {
        let cascade = Cascade {
            runner,
            queue: LocalQueue::new_fifo(),
        };
        let previous = CASCADE.with(|slot| slot.replace(Some(cascade)));
        Self { tally, previous }
    }
}

impl Drop for CascadeScope {
    fn drop(&mut self) {
        let current = CASCADE.with(|slot| slot.replace(self.previous.take()));
        // only reachable with work left over if a task unwound the worker
        if let Some(cascade) = current {
            while let Some(task) = cascade.queue.pop() {
                self.tally.live.fetch_sub(1, Ordering::AcqRel);
                self.tally.stats.record_rejected();
                task.reject(Error::executor("worker thread exited before running task"));
            }
        }
    }
}

// state shared with worker threads
#[derive(Debug, Default)]
struct Tally {
    live: AtomicUsize,
    stats: RunnerStats,
}

impl Tally {
    fn run(&self, task: PausedTask) {
        // a cascaded task may run while the worker waits inside a work item
        let _scope = WorkItemScope::enter(false);
        task.run();
        self.stats.record_executed();
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

struct ParallelShared {
    id: RunnerId,
    config: RunnerConfig,
    disposed: AtomicBool,
    spawned: AtomicU64,
    tally: Arc<Tally>,
    panic_handler: PanicHandler,
}

impl ParallelShared {
    fn spawn_worker(&self, task: PausedTask) -> Result<()> {
        let seq = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.config.thread_name_prefix, seq));
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let runner = task.runner().clone();
        let rejector = task.rejector();
        let tally = self.tally.clone();
        let id = self.id;

        let spawned = builder.spawn(move || {
            registry::with_runner(runner, || {
                let _cascade = CascadeScope::enter(id, tally.clone());
                tally.run(task);
                while let Some(next) = cascade_pop() {
                    tally.run(next);
                }
            });
        });

        match spawned {
            Ok(_) => {
                tracing::trace!(runner = %self.config.name, worker = seq, "spawned worker");
                Ok(())
            }
            Err(e) => {
                self.tally.live.fetch_sub(1, Ordering::AcqRel);
                self.tally.stats.record_rejected();
                let err = Error::executor(format!("spawn failed: {}", e));
                tracing::warn!(runner = %self.config.name, error = %err, "task rejected");
                rejector.reject(err.clone());
                Err(err)
            }
        }
    }
}

impl Runner for ParallelShared {
    fn id(&self) -> RunnerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn submit(&self, task: PausedTask) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            let err = Error::Disposed(self.config.name.clone());
            self.tally.stats.record_rejected();
            task.reject(err.clone());
            return Err(err);
        }

        self.tally.live.fetch_add(1, Ordering::AcqRel);
        self.tally.stats.record_scheduled();

        // only continuations released by the worker's own task cascade;
        // ones registered by user code must not wait for that task to end
        if !task.is_continuation() || in_work_item() {
            return self.spawn_worker(task);
        }
        match cascade_push(self.id, task) {
            Ok(()) => {
                tracing::trace!(runner = %self.config.name, "cascaded continuation");
                Ok(())
            }
            Err(task) => self.spawn_worker(task),
        }
    }

    fn wait(&self, flag: &CompletionFlag) {
        if !is_worker_of(self.id) {
            flag.wait(self.config.wait_strategy);
            return;
        }

        // the awaited task may sit in this worker's own cascade queue
        let mut backoff = Backoff::new();
        while !flag.is_set() {
            match cascade_pop() {
                Some(task) => {
                    self.tally.run(task);
                    backoff.reset();
                }
                None => backoff.snooze(),
            }
        }
    }

    fn scheduled_task_count(&self) -> usize {
        self.tally.live.load(Ordering::Acquire)
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
            live = self.tally.live.load(Ordering::Relaxed),
            "disposed parallel runner"
        );
        Disposal::Disposed
    }

    fn panic_handler(&self) -> &PanicHandler {
        &self.panic_handler
    }

    fn stats(&self) -> StatsSnapshot {
        self.tally.stats.snapshot(
            self.tally.live.load(Ordering::Acquire),
            self.panic_handler.panic_count(),
        )
    }
}

/// Runner that starts a new OS thread for every task.
///
/// Each worker thread has the runner registered in the
/// [registry](crate::registry) while it runs, so work scheduled from inside a
/// task lands on the same runner. Continuations that become ready on a worker
/// and target this runner run on that worker once its current task is done.
/// Thread creation is unbounded. Disposal only stops new submissions.
#[derive(Clone)]
pub struct ParallelRunner {
    shared: Arc<ParallelShared>,
    handle: RunnerHandle,
}

impl ParallelRunner {
    /// A runner named `parallel` with default settings.
    pub fn new() -> Self {
        Self::build(RunnerConfig::named("parallel"))
    }

    /// A runner with `config`, validated first.
    pub fn with_config(config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RunnerConfig) -> Self {
        let shared = Arc::new(ParallelShared {
            id: RunnerId::next(),
            panic_handler: PanicHandler::new(config.panic_strategy),
            config,
            disposed: AtomicBool::new(false),
            spawned: AtomicU64::new(0),
            tally: Arc::new(Tally::default()),
        });
        let handle = RunnerHandle::from(shared.clone());
        tracing::debug!(runner = %shared.config.name, id = %shared.id, "created parallel runner");

        Self { shared, handle }
    }

    /// Handle used to schedule work on this runner.
    pub fn handle(&self) -> RunnerHandle {
        self.handle.clone()
    }

    /// Blocks until no accepted task is left unrun.
    pub fn wait_idle(&self) {
        let mut backoff = Backoff::new();
        while self.shared.tally.live.load(Ordering::Acquire) > 0 {
            backoff.snooze();
        }
    }
}

impl Default for ParallelRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParallelRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelRunner")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("live", &self.shared.tally.live.load(Ordering::Relaxed))
            .field("disposed", &self.shared.disposed.load(Ordering::Relaxed))
            .finish()
    }
}
