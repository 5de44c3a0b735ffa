//! taskweave - continuation-chained tasks on pluggable runners
//!
//! Work is scheduled on a [`Runner`] and comes back as a [`Task`]. Tasks are
//! chained with [`then`](Task::then) and friends; each continuation becomes
//! runnable once its predecessor completes and receives the predecessor's
//! value or error. Awaiting a task blocks the calling thread.
//!
//! # Quick Start
//!
//! ```
//! use taskweave::prelude::*;
//!
//! let runner = ParallelRunner::new();
//! let handle = runner.handle();
//!
//! let answer = handle
//!     .schedule(|| Ok(20))
//!     .unwrap()
//!     .then(|x| Ok(x + 1))
//!     .then(|x| Ok(x * 2));
//!
//! assert_eq!(answer.join().unwrap(), 42);
//! ```
//!
//! # Runners
//!
//! - [`ManualRunner`]: a FIFO queue drained by its owner, or by whichever
//!   thread has it registered while awaiting one of its tasks
//! - [`ParallelRunner`]: one OS thread per task; continuations that become
//!   ready on a worker run on that worker
//!
//! Each thread may have a current runner in the [`registry`], which is how
//! work scheduled from inside a task finds its runner.
//!
//! # Errors
//!
//! A failing or panicking work item never unwinds into the scheduling thread.
//! Its error is kept on the task and handed to continuations as their
//! incoming error; [`then`](Task::then) skips its body and passes the error
//! on, [`then_result`](Task::then_result) sees it as data. An error nobody
//! awaits stays on the last task of its chain.

#![warn(missing_docs, missing_debug_implementations)]

pub mod combinator;
pub mod config;
pub mod error;
pub mod prelude;
pub mod registry;
pub mod runner;
pub mod task;

mod util;

pub use combinator::{merge, when_all};
pub use config::{RunnerConfig, RunnerConfigBuilder, WaitStrategy};
pub use error::{AggregateError, Error, Result};
pub use registry::{
    current_runner, set_current_runner, try_current_runner, with_new_runner, with_runner,
};
pub use runner::{
    Disposal, ManualRunner, PanicStrategy, ParallelRunner, Runner, RunnerHandle, RunnerId,
    StatsSnapshot,
};
pub use task::{ActionTask, CompletionFlag, PausedTask, Task, TaskId};

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_chain_across_runners() {
        let manual = ManualRunner::new();
        let parallel = ParallelRunner::new();

        let task = parallel
            .handle()
            .schedule(|| Ok(2))
            .unwrap()
            .then_on(&manual.handle(), |x| Ok(x * 3))
            .then_on(&parallel.handle(), |x| Ok(x + 1));

        assert_eq!(manual.block_on(&task).unwrap(), 7);
    }

    #[test]
    fn test_action_tasks() {
        let runner = ManualRunner::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first: ActionTask = {
            let log = log.clone();
            runner
                .handle()
                .schedule(move || {
                    log.lock().push("first");
                    Ok(())
                })
                .unwrap()
        };
        let second = {
            let log = log.clone();
            first.then(move |()| {
                log.lock().push("second");
                Ok(())
            })
        };

        runner.block_on(&second).unwrap();
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_scoped_runner() {
        let value = with_new_runner(
            || Ok(ManualRunner::new().handle()),
            |_| {
                let runner = current_runner()?;
                let task = runner.schedule(|| Ok("scoped"))?;
                task.join()
            },
        )
        .unwrap();

        assert_eq!(value.unwrap(), "scoped");
    }
}
