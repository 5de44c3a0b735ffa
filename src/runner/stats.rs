//! Runner counters.

use std::sync::atomic::{AtomicU64, Ordering};

// counters shared by a runner and its worker threads
#[derive(Debug, Default)]
pub(crate) struct RunnerStats {
    scheduled: AtomicU64,
    executed: AtomicU64,
    rejected: AtomicU64,
}

impl RunnerStats {
    pub(crate) fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, pending: usize, panicked: usize) -> StatsSnapshot {
        StatsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            panicked: panicked as u64,
            pending: pending as u64,
        }
    }
}

/// Point-in-time view of a runner's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Tasks accepted by `submit`.
    pub scheduled: u64,
    /// Tasks that ran to completion on the runner.
    pub executed: u64,
    /// Tasks refused, e.g. after disposal.
    pub rejected: u64,
    /// Work items that panicked.
    pub panicked: u64,
    /// Tasks accepted but not yet run.
    pub pending: u64,
}
