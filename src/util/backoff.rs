//! Exponential backoff for the busy-wait paths of `wait`.

use std::hint::spin_loop;
use std::thread;
use std::time::Duration;

/// Spin, then yield, then sleep for short stretches.
///
/// Owned by a single waiting thread, so the step counter is a plain field.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;
    const SLEEP: Duration = Duration::from_micros(50);

    pub(crate) fn new() -> Self {
        Self { step: 0 }
    }

    /// Called after useful work was found; restarts at the cheap end.
    pub(crate) fn reset(&mut self) {
        self.step = 0;
    }

    /// Wait a little longer than last time.
    pub(crate) fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(Self::SLEEP);
        }

        if self.step <= Self::YIELD_LIMIT {
            self.step += 1;
        }
    }
}
