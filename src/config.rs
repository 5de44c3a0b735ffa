//! Runner configuration.

use crate::error::{Error, Result};
use crate::runner::PanicStrategy;

const MIN_STACK_SIZE: usize = 64 * 1024;

/// How a thread blocks while waiting for a completion flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Spin with exponential backoff, then yield, then sleep briefly.
    Spin,
    /// Park on a condition variable until the flag is set.
    Park,
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::Spin
    }
}

/// Settings shared by both runner kinds.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Name used in logs and in `Error::Disposed`.
    pub name: String,
    /// How waiting threads block.
    pub wait_strategy: WaitStrategy,
    /// What happens when a work item panics.
    pub panic_strategy: PanicStrategy,

    // parallel runner only
    /// Worker threads are named `{prefix}-{n}`.
    pub thread_name_prefix: String,
    /// Worker stack size in bytes; `None` keeps the platform default.
    pub stack_size: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: "runner".to_string(),
            wait_strategy: WaitStrategy::default(),
            panic_strategy: PanicStrategy::default(),
            thread_name_prefix: "taskweave-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
        }
    }
}

impl RunnerConfig {
    /// Starts from the defaults.
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::new()
    }

    /// Default config with the given runner name.
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Fails with [`Error::Config`] on an empty name, a NUL in the
    /// thread name prefix, or a stack below 64 KiB.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("runner name must not be empty"));
        }

        if self.thread_name_prefix.contains('\0') {
            return Err(Error::config("thread_name_prefix must not contain NUL"));
        }

        if let Some(size) = self.stack_size {
            if size < MIN_STACK_SIZE {
                return Err(Error::config(format!(
                    "stack_size must be at least {} bytes",
                    MIN_STACK_SIZE
                )));
            }
        }

        Ok(())
    }
}

/// Builder for [`RunnerConfig`]; [`build`](RunnerConfigBuilder::build) validates.
#[derive(Debug, Default)]
pub struct RunnerConfigBuilder {
    config: RunnerConfig,
}

impl RunnerConfigBuilder {
    /// A builder holding the default config.
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
        }
    }

    /// Sets the runner name.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the wait strategy.
    pub fn wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.config.wait_strategy = strategy;
        self
    }

    /// Sets the panic strategy.
    pub fn panic_strategy(mut self, strategy: PanicStrategy) -> Self {
        self.config.panic_strategy = strategy;
        self
    }

    /// Sets the worker thread name prefix.
    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the worker stack size in bytes.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Validates and returns the config.
    pub fn build(self) -> Result<RunnerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
