//! Panic capture for work items.

use crate::error::{Error, Result};
use crate::task::TaskId;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// What a runner does when a work item panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanicStrategy {
    /// Abort the process.
    Abort,
    /// Settle the task with [`Error::Panicked`] without logging.
    Isolate,
    /// Settle the task with [`Error::Panicked`] and log the panic.
    #[default]
    LogAndContinue,
}

/// Keeps panics in work items from unwinding through a runner.
///
/// Every closure a runner executes for a task goes through
/// [`guard`](PanicHandler::guard); a panic turns into the task's error.
#[derive(Debug, Default)]
pub struct PanicHandler {
    strategy: PanicStrategy,
    caught: AtomicUsize,
}

impl PanicHandler {
    /// A handler applying `strategy`.
    pub fn new(strategy: PanicStrategy) -> Self {
        Self {
            strategy,
            caught: AtomicUsize::new(0),
        }
    }

    /// Runs the work item of `task`, mapping a panic to [`Error::Panicked`].
    pub fn guard<F, R>(&self, task: TaskId, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
            let info = PanicInfo::new(task, payload);
            self.report(&info);
            Err(info.into())
        })
    }

    fn report(&self, info: &PanicInfo) {
        self.caught.fetch_add(1, Ordering::Relaxed);
        match self.strategy {
            PanicStrategy::Abort => {
                tracing::error!(
                    task = %info.task,
                    message = %info.message,
                    "task panicked, aborting"
                );
                std::process::abort();
            }
            PanicStrategy::Isolate => {}
            PanicStrategy::LogAndContinue => {
                tracing::error!(task = %info.task, message = %info.message, "task panicked");
            }
        }
    }

    /// Panics caught so far.
    pub fn panic_count(&self) -> usize {
        self.caught.load(Ordering::Relaxed)
    }

    /// The configured strategy.
    pub fn strategy(&self) -> PanicStrategy {
        self.strategy
    }
}

/// A caught panic and the task it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicInfo {
    /// Task whose work item panicked.
    pub task: TaskId,
    /// Panic payload, if it was a string.
    pub message: String,
}

impl PanicInfo {
    fn new(task: TaskId, payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(msg) => *msg,
            Err(payload) => payload
                .downcast_ref::<&str>()
                .map_or_else(|| "non-string panic payload".to_string(), |s| s.to_string()),
        };
        Self { task, message }
    }
}

impl From<PanicInfo> for Error {
    fn from(info: PanicInfo) -> Self {
        Error::Panicked(info.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_message() {
        let handler = PanicHandler::new(PanicStrategy::Isolate);

        let result: Result<()> = handler.guard(TaskId::next(), || panic!("test panic"));

        assert_eq!(result, Err(Error::Panicked("test panic".to_string())));
        assert_eq!(handler.panic_count(), 1);
    }

    #[test]
    fn test_formatted_message() {
        let handler = PanicHandler::new(PanicStrategy::LogAndContinue);

        let result: Result<()> = handler.guard(TaskId::next(), || panic!("bad value {}", 7));

        assert_eq!(result, Err(Error::Panicked("bad value 7".to_string())));
    }

    #[test]
    fn test_errors_are_not_counted() {
        let handler = PanicHandler::default();

        assert_eq!(handler.guard(TaskId::next(), || Ok(42)), Ok(42));
        assert_eq!(
            handler.guard(TaskId::next(), || -> Result<()> { Err(Error::task_failed("no")) }),
            Err(Error::task_failed("no"))
        );
        assert_eq!(handler.panic_count(), 0);
        assert_eq!(handler.strategy(), PanicStrategy::LogAndContinue);
    }
}
