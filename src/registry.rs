//! Per-thread "current runner" registry.
//!
//! Work that schedules more work (`registry::current_runner()?.schedule(..)`)
//! finds its runner here. Worker threads of a [`ParallelRunner`] and threads
//! driving a [`ManualRunner`] register themselves for as long as they run
//! tasks. Any other thread has no entry until it sets one.
//!
//! [`ParallelRunner`]: crate::ParallelRunner
//! [`ManualRunner`]: crate::ManualRunner

use crate::error::{Error, Result};
use crate::runner::{RunnerHandle, RunnerId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

static THREAD_RUNNERS: OnceLock<RwLock<HashMap<ThreadId, RunnerHandle>>> = OnceLock::new();

fn thread_runners() -> &'static RwLock<HashMap<ThreadId, RunnerHandle>> {
    THREAD_RUNNERS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Sets or clears the calling thread's runner and returns the previous one.
pub fn set_current_runner(runner: Option<RunnerHandle>) -> Option<RunnerHandle> {
    let thread_id = thread::current().id();
    let mut map = thread_runners().write();
    match runner {
        Some(runner) => map.insert(thread_id, runner),
        None => map.remove(&thread_id),
    }
}

/// The calling thread's runner.
///
/// Fails with [`Error::NoCurrentRunner`] if none is registered.
pub fn current_runner() -> Result<RunnerHandle> {
    try_current_runner().ok_or(Error::NoCurrentRunner)
}

/// The calling thread's runner, if any.
pub fn try_current_runner() -> Option<RunnerHandle> {
    thread_runners().read().get(&thread::current().id()).cloned()
}

pub(crate) fn current_runner_id() -> Option<RunnerId> {
    thread_runners()
        .read()
        .get(&thread::current().id())
        .map(RunnerHandle::id)
}

// Puts the previous registration back, also when unwinding.
struct Restore {
    previous: Option<RunnerHandle>,
}

impl Drop for Restore {
    fn drop(&mut self) {
        set_current_runner(self.previous.take());
    }
}

/// Runs `f` with `runner` registered for the calling thread, then restores
/// whatever was registered before.
pub fn with_runner<R, F>(runner: RunnerHandle, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _restore = Restore {
        previous: set_current_runner(Some(runner)),
    };
    f()
}

// Disposes the scoped runner, also when unwinding.
struct DisposeOnDrop(RunnerHandle);

impl Drop for DisposeOnDrop {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

/// Creates a runner with `factory`, registers it for the calling thread
/// while `action` runs, then disposes it and restores the previous entry.
///
/// Factory errors are returned without calling `action`.
pub fn with_new_runner<R, F, A>(factory: F, action: A) -> Result<R>
where
    F: FnOnce() -> Result<RunnerHandle>,
    A: FnOnce(&RunnerHandle) -> R,
{
    let runner = factory()?;
    tracing::debug!(runner = %runner.name(), "entering scoped runner");

    let guard = DisposeOnDrop(runner.clone());
    let result = with_runner(runner, || action(&guard.0));
    drop(guard);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ManualRunner, ParallelRunner};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_no_runner_by_default() {
        assert!(try_current_runner().is_none());
        assert_eq!(current_runner().unwrap_err(), Error::NoCurrentRunner);
    }

    #[test]
    fn test_set_and_clear() {
        let runner = ManualRunner::new();

        assert!(set_current_runner(Some(runner.handle())).is_none());
        assert_eq!(current_runner().unwrap(), runner.handle());

        let previous = set_current_runner(None);
        assert_eq!(previous, Some(runner.handle()));
        assert!(try_current_runner().is_none());
    }

    #[test]
    fn test_entries_are_per_thread() {
        let runner = ManualRunner::new();

        with_runner(runner.handle(), || {
            let seen = thread::spawn(|| try_current_runner().is_some())
                .join()
                .unwrap();
            assert!(!seen);
            assert!(try_current_runner().is_some());
        });
    }

    #[test]
    fn test_with_runner_nests() {
        let outer = ManualRunner::new();
        let inner = ManualRunner::new();

        with_runner(outer.handle(), || {
            with_runner(inner.handle(), || {
                assert_eq!(current_runner_id(), Some(inner.handle().id()));
            });
            assert_eq!(current_runner_id(), Some(outer.handle().id()));
        });
        assert!(current_runner_id().is_none());
    }

    #[test]
    fn test_with_runner_restores_on_panic() {
        let runner = ManualRunner::new();

        let result = catch_unwind(AssertUnwindSafe(|| {
            with_runner(runner.handle(), || panic!("inside scope"));
        }));

        assert!(result.is_err());
        assert!(try_current_runner().is_none());
    }

    #[test]
    fn test_with_new_runner_disposes() {
        let mut seen = None;

        let value = with_new_runner(
            || Ok(ParallelRunner::new().handle()),
            |runner| {
                seen = Some(runner.clone());
                assert_eq!(current_runner().unwrap(), *runner);
                let task = runner.schedule(|| Ok(6)).unwrap();
                task.join().unwrap() * 7
            },
        )
        .unwrap();

        assert_eq!(value, 42);
        assert!(seen.unwrap().is_disposed());
        assert!(try_current_runner().is_none());
    }

    #[test]
    fn test_with_new_runner_factory_error() {
        let mut called = false;

        let err = with_new_runner(|| Err(Error::config("bad")), |_| called = true).unwrap_err();

        assert_eq!(err, Error::config("bad"));
        assert!(!called);
    }

    #[test]
    fn test_with_new_runner_disposes_on_panic() {
        let runner = ManualRunner::new();
        let handle = runner.handle();

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _ = with_new_runner(|| Ok(handle.clone()), |_| -> () { panic!("fail") });
        }));

        assert!(result.is_err());
        assert!(handle.is_disposed());
        assert!(try_current_runner().is_none());
    }
}
