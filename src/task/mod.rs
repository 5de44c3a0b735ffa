//! Tasks, their completion flags and paused continuations.

pub mod flag;
pub mod node;
pub mod paused;

pub use flag::CompletionFlag;
pub use node::Task;
pub use paused::PausedTask;

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

thread_local! {
    static IN_WORK_ITEM: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread is inside a user work item right now.
///
/// Continuations submitted from inside a work item were registered by user
/// code, not released by the completion of the task the thread is running.
pub(crate) fn in_work_item() -> bool {
    IN_WORK_ITEM.with(Cell::get)
}

/// Marks the calling thread as inside or outside a work item until dropped.
pub(crate) struct WorkItemScope {
    previous: bool,
}

impl WorkItemScope {
    pub(crate) fn enter(inside: bool) -> Self {
        Self {
            previous: IN_WORK_ITEM.with(|cell| cell.replace(inside)),
        }
    }
}

impl Drop for WorkItemScope {
    fn drop(&mut self) {
        IN_WORK_ITEM.with(|cell| cell.set(self.previous));
    }
}

/// A task that produces no value.
pub type ActionTask = Task<()>;
