//! Live task handles and the continuation chain.

use super::flag::CompletionFlag;
use super::paused::{PausedTask, Reject};
use super::{TaskId, WorkItemScope};
use crate::error::{Error, Result};
use crate::registry;
use crate::runner::RunnerHandle;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Hook<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

struct NodeState<T> {
    incoming: Option<Error>,
    outcome: Option<Result<T>>,
    // drained exactly once, when the outcome is recorded
    continuations: Vec<Hook<T>>,
}

pub(crate) struct TaskNode<T> {
    id: TaskId,
    label: Option<String>,
    runner: RunnerHandle,
    flag: CompletionFlag,
    state: Mutex<NodeState<T>>,
}

impl<T: Clone + Send + 'static> TaskNode<T> {
    /// Records the outcome, sets the flag, then fires the continuations
    /// registered so far. Later registrations see the outcome directly.
    fn complete(&self, outcome: Result<T>) {
        let hooks = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                tracing::warn!(task = %self.id, "ignoring second completion");
                return;
            }
            state.outcome = Some(outcome.clone());
            self.flag.set();
            std::mem::take(&mut state.continuations)
        };

        if let Err(ref error) = outcome {
            tracing::debug!(task = %self.id, %error, "task failed");
        }

        for hook in hooks {
            hook(outcome.clone());
        }
    }
}

impl<T: Clone + Send + 'static> Reject for TaskNode<T> {
    fn reject(&self, error: Error) {
        self.complete(Err(error));
    }
}

/// What a continuation does with its predecessor's outcome.
enum Body<T, U> {
    /// Runs only on success; errors pass straight through.
    Map(Box<dyn FnOnce(T) -> Result<U> + Send + 'static>),
    /// Runs on success and on failure.
    Inspect(Box<dyn FnOnce(Result<T>) -> Result<U> + Send + 'static>),
    /// Runs on success and completes with the returned task's outcome.
    Flatten(Box<dyn FnOnce(T) -> Result<Task<U>> + Send + 'static>),
}

impl<T, U: Clone + Send + 'static> Body<T, U> {
    fn run(self, node: Task<U>, input: Result<T>) {
        match self {
            Body::Map(f) => {
                let outcome = match input {
                    Ok(value) => node.guarded(|| f(value)),
                    Err(error) => Err(error),
                };
                node.inner.complete(outcome);
            }
            Body::Inspect(f) => {
                let outcome = node.guarded(|| f(input));
                node.inner.complete(outcome);
            }
            Body::Flatten(f) => match input.and_then(|value| node.guarded(|| f(value))) {
                Ok(inner) => {
                    let outer = node.inner.clone();
                    inner.subscribe(move |outcome| outer.complete(outcome));
                }
                Err(error) => node.inner.complete(Err(error)),
            },
        }
    }
}

/// Handle to a unit of work scheduled on a runner.
///
/// `Task<()>` is an action, any other `T` is a function producing a value.
/// Clones share the same node. A failed work item never unwinds into the
/// scheduling thread: the error is kept on the node and surfaces through
/// [`wait`](Task::wait), [`join`](Task::join),
/// [`outgoing_error`](Task::outgoing_error) or a continuation's incoming
/// error. An error nobody looks at stays on the last node of its chain.
pub struct Task<T> {
    inner: Arc<TaskNode<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Task<T> {
    fn pending(runner: RunnerHandle, label: Option<String>) -> Self {
        Task {
            inner: Arc::new(TaskNode {
                id: TaskId::next(),
                label,
                runner,
                flag: CompletionFlag::new(),
                state: Mutex::new(NodeState {
                    incoming: None,
                    outcome: None,
                    continuations: Vec::new(),
                }),
            }),
        }
    }

    /// A task that is already complete with `outcome`.
    ///
    /// Continuations attached to it are scheduled immediately on `runner`.
    pub fn completed(runner: &RunnerHandle, outcome: Result<T>) -> Self {
        let task = Task::pending(runner.clone(), None);
        task.inner.complete(outcome);
        task
    }

    pub(crate) fn spawn<F>(runner: &RunnerHandle, label: Option<String>, f: F) -> Result<Self>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let task = Task::pending(runner.clone(), label.clone());
        let node = task.clone();
        let paused = PausedTask::new(
            runner.clone(),
            label,
            None,
            task.inner.clone(),
            move |incoming| {
                let input = incoming.map_or(Ok(()), Err);
                Body::<(), T>::Map(Box::new(move |()| f())).run(node, input);
            },
        );

        paused.schedule()?;
        Ok(task)
    }

    /// Unique id of this task.
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Label given at scheduling, if any.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// The runner this task was scheduled on.
    pub fn runner(&self) -> &RunnerHandle {
        &self.inner.runner
    }

    /// Whether the outcome has been recorded.
    pub fn is_completed(&self) -> bool {
        self.inner.flag.is_set()
    }

    /// The error handed down by the predecessor, if any.
    pub fn incoming_error(&self) -> Option<Error> {
        self.inner.state.lock().incoming.clone()
    }

    /// The error this task completed with. `None` while still running.
    pub fn outgoing_error(&self) -> Option<Error> {
        let state = self.inner.state.lock();
        match &state.outcome {
            Some(Err(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// The outcome, without blocking. `None` while still running.
    pub fn try_result(&self) -> Option<Result<T>> {
        self.inner.state.lock().outcome.clone()
    }

    /// Runs `f` with this task's value on this task's runner.
    ///
    /// If this task fails, `f` is skipped and the returned task fails with
    /// the same error.
    pub fn then<U, F>(&self, f: F) -> Task<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        self.chain(self.inner.runner.clone(), None, Body::Map(Box::new(f)))
    }

    /// [`then`](Task::then) with a label on the new task.
    pub fn then_named<U, F, S>(&self, label: S, f: F) -> Task<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
        S: Into<String>,
    {
        self.chain(
            self.inner.runner.clone(),
            Some(label.into()),
            Body::Map(Box::new(f)),
        )
    }

    /// [`then`](Task::then), scheduled on `runner`.
    pub fn then_on<U, F>(&self, runner: &RunnerHandle, f: F) -> Task<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        self.chain(runner.clone(), None, Body::Map(Box::new(f)))
    }

    /// Runs `f`, which starts another task; the returned task completes with
    /// that task's outcome.
    pub fn then_async<U, F>(&self, f: F) -> Task<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Task<U>> + Send + 'static,
    {
        self.chain(self.inner.runner.clone(), None, Body::Flatten(Box::new(f)))
    }

    /// [`then_async`](Task::then_async), scheduled on `runner`.
    pub fn then_async_on<U, F>(&self, runner: &RunnerHandle, f: F) -> Task<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Task<U>> + Send + 'static,
    {
        self.chain(runner.clone(), None, Body::Flatten(Box::new(f)))
    }

    /// Runs `f` with this task's outcome, success or failure.
    pub fn then_result<U, F>(&self, f: F) -> Task<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T>) -> Result<U> + Send + 'static,
    {
        self.chain(self.inner.runner.clone(), None, Body::Inspect(Box::new(f)))
    }

    /// [`then_result`](Task::then_result), scheduled on `runner`.
    pub fn then_result_on<U, F>(&self, runner: &RunnerHandle, f: F) -> Task<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T>) -> Result<U> + Send + 'static,
    {
        self.chain(runner.clone(), None, Body::Inspect(Box::new(f)))
    }

    /// Moves the chain onto `runner`.
    ///
    /// Returns this task unchanged when it already belongs to `runner`,
    /// otherwise a task on `runner` that completes with this task's outcome.
    pub fn on(&self, runner: &RunnerHandle) -> Task<T> {
        if *runner == self.inner.runner {
            return self.clone();
        }
        self.chain(
            runner.clone(),
            self.inner.label.clone(),
            Body::Map(Box::new(|value: T| Ok(value))),
        )
    }

    /// Blocks until the task completes and returns its error, if any.
    pub fn wait(&self) -> Result<()> {
        self.block();
        match self.outgoing_error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Blocks until the task completes and returns its outcome.
    pub fn join(&self) -> Result<T> {
        self.block();
        match self.try_result() {
            Some(outcome) => outcome,
            None => unreachable!("task {} signalled completion without an outcome", self.id()),
        }
    }

    // The calling thread's runner does the waiting when there is one, so a
    // manual runner keeps draining its queue instead of stalling on a task
    // that lives somewhere else.
    fn block(&self) {
        if self.inner.flag.is_set() {
            return;
        }
        let runner =
            registry::try_current_runner().unwrap_or_else(|| self.inner.runner.clone());
        runner.wait(&self.inner.flag);
    }

    fn guarded<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let _scope = WorkItemScope::enter(true);
        self.inner.runner.panic_handler().guard(self.inner.id, f)
    }

    fn subscribe<F>(&self, hook: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if let Some(outcome) = state.outcome.clone() {
            drop(state);
            hook(outcome);
        } else {
            state.continuations.push(Box::new(hook));
        }
    }

    fn chain<U>(&self, runner: RunnerHandle, label: Option<String>, body: Body<T, U>) -> Task<U>
    where
        U: Clone + Send + 'static,
    {
        let next = Task::pending(runner.clone(), label.clone());
        let target = next.clone();

        self.subscribe(move |outcome: Result<T>| {
            let incoming = outcome.as_ref().err().cloned();
            target.inner.state.lock().incoming = incoming.clone();

            let rejector: Arc<dyn Reject> = target.inner.clone();
            let paused = PausedTask::new(runner, label, incoming, rejector, move |incoming| {
                let input = match incoming {
                    Some(error) => Err(error),
                    None => outcome,
                };
                body.run(target, input);
            })
            .mark_continuation();

            // a rejected continuation is settled by the runner
            let _ = paused.schedule();
        });

        next
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("runner", &self.inner.runner)
            .field("completed", &self.inner.flag.is_set())
            .finish()
    }
}
