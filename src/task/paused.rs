//! Inert continuations waiting to be handed to a runner.

use crate::error::{Error, Result};
use crate::runner::RunnerHandle;
use std::fmt;
use std::sync::Arc;

type Work = Box<dyn FnOnce(Option<Error>) + Send + 'static>;

/// Settles a node that will never run because its runner refused it.
pub(crate) trait Reject: Send + Sync {
    fn reject(&self, error: Error);
}

/// A continuation that has not started yet.
///
/// Built by the chaining operations on [`Task`](crate::Task) once the
/// predecessor's outcome is known. The thunk receives the incoming error and
/// short-circuits when there is one. Scheduling consumes the value, so a
/// paused task reaches a runner at most once.
pub struct PausedTask {
    runner: RunnerHandle,
    label: Option<String>,
    incoming_error: Option<Error>,
    work: Work,
    node: Arc<dyn Reject>,
    continuation: bool,
}

impl PausedTask {
    pub(crate) fn new<F>(
        runner: RunnerHandle,
        label: Option<String>,
        incoming_error: Option<Error>,
        node: Arc<dyn Reject>,
        work: F,
    ) -> Self
    where
        F: FnOnce(Option<Error>) + Send + 'static,
    {
        Self {
            runner,
            label,
            incoming_error,
            work: Box::new(work),
            node,
            continuation: false,
        }
    }

    // set on tasks created by chaining rather than by `schedule`
    pub(crate) fn mark_continuation(mut self) -> Self {
        self.continuation = true;
        self
    }

    /// The runner this task is bound to.
    pub fn runner(&self) -> &RunnerHandle {
        &self.runner
    }

    /// Label of the task this will complete.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether this task continues a predecessor.
    pub fn is_continuation(&self) -> bool {
        self.continuation
    }

    /// The error received from the predecessor, if it failed.
    pub fn incoming_error(&self) -> Option<&Error> {
        self.incoming_error.as_ref()
    }

    /// Hands the task to its runner.
    ///
    /// On rejection the runner has already settled the task's node with the
    /// returned error.
    pub fn schedule(self) -> Result<()> {
        let runner = self.runner.clone();
        runner.submit(self)
    }

    /// Executes the thunk. Only runners call this.
    pub fn run(self) {
        tracing::trace!(
            runner = %self.runner.name(),
            label = self.label.as_deref().unwrap_or(""),
            short_circuit = self.incoming_error.is_some(),
            "running task"
        );
        (self.work)(self.incoming_error);
    }

    /// Settles the node with `error` without running the thunk.
    ///
    /// Runner implementations call this when they refuse a task.
    pub fn reject(self, error: Error) {
        tracing::warn!(
            runner = %self.runner.name(),
            label = self.label.as_deref().unwrap_or(""),
            %error,
            "task rejected"
        );
        self.node.reject(error);
    }

    /// Handle that settles the node even after `self` has been moved away.
    pub(crate) fn rejector(&self) -> Arc<dyn Reject> {
        self.node.clone()
    }
}

impl fmt::Debug for PausedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PausedTask")
            .field("runner", &self.runner)
            .field("label", &self.label)
            .field("incoming_error", &self.incoming_error)
            .field("continuation", &self.continuation)
            .finish()
    }
}
