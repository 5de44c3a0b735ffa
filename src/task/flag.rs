//! Set-once completion signal.

use crate::config::WaitStrategy;
use crate::util::Backoff;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

/// Marks a task as finished.
///
/// The flag goes from unset to set at most once. Everything written before
/// [`set`](CompletionFlag::set) is visible to a thread that observes
/// [`is_set`](CompletionFlag::is_set) returning `true`.
#[derive(Debug, Default)]
pub struct CompletionFlag {
    set: AtomicBool,
    // only used by WaitStrategy::Park
    lock: Mutex<()>,
    cond: Condvar,
}

impl CompletionFlag {
    /// An unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes parked waiters.
    ///
    /// Returns `false` if the flag was already set; the call is then a no-op.
    pub fn set(&self) -> bool {
        let _guard = self.lock.lock();
        if self.set.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cond.notify_all();
        true
    }

    /// Whether the flag has been set.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Blocks the calling thread until the flag is set.
    pub fn wait(&self, strategy: WaitStrategy) {
        if self.is_set() {
            return;
        }

        match strategy {
            WaitStrategy::Spin => {
                let mut backoff = Backoff::new();
                while !self.is_set() {
                    backoff.snooze();
                }
            }
            WaitStrategy::Park => {
                let mut guard = self.lock.lock();
                while !self.is_set() {
                    self.cond.wait(&mut guard);
                }
            }
        }
    }
}
