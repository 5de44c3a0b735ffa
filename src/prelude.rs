//! Common imports.
//!
//! ```
//! use taskweave::prelude::*;
//! ```

pub use crate::combinator::{merge, when_all};
pub use crate::config::{RunnerConfig, WaitStrategy};
pub use crate::error::{AggregateError, Error, Result};
pub use crate::registry::{current_runner, try_current_runner, with_new_runner, with_runner};
pub use crate::runner::{Disposal, ManualRunner, ParallelRunner, Runner, RunnerHandle};
pub use crate::task::{ActionTask, Task};
