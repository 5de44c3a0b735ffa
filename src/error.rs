//! Crate error type.

use std::sync::Arc;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by runners and tasks.
///
/// Errors are cloned into every continuation that observes them, so the enum
/// is `Clone`. Caller-supplied errors are shared behind an `Arc` and compare
/// equal only to clones of the same error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The named runner was disposed and refuses new work.
    #[error("runner `{0}` is disposed")]
    Disposed(String),

    /// The calling thread has no registered runner.
    #[error("no runner registered for the current thread")]
    NoCurrentRunner,

    /// A work item panicked with this message.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// A work item failed.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// Several tasks failed; see [`AggregateError`].
    #[error(transparent)]
    Aggregate(AggregateError),

    /// Invalid runner configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A runner could not execute a task, e.g. thread spawn failure.
    #[error("executor error: {0}")]
    Executor(String),

    /// An error from outside the crate.
    #[error(transparent)]
    External(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Shorthand for [`Error::TaskFailed`].
    pub fn task_failed<S: Into<String>>(msg: S) -> Self {
        Error::TaskFailed(msg.into())
    }

    /// Shorthand for [`Error::Config`].
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Shorthand for [`Error::Executor`].
    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    /// Wraps a foreign error.
    pub fn external<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::External(Arc::new(err))
    }

    /// The sub-errors when this is an aggregate, otherwise `None`.
    pub fn as_aggregate(&self) -> Option<&AggregateError> {
        match self {
            Error::Aggregate(agg) => Some(agg),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Disposed(a), Error::Disposed(b)) => a == b,
            (Error::NoCurrentRunner, Error::NoCurrentRunner) => true,
            (Error::Panicked(a), Error::Panicked(b)) => a == b,
            (Error::TaskFailed(a), Error::TaskFailed(b)) => a == b,
            (Error::Aggregate(a), Error::Aggregate(b)) => a == b,
            (Error::Config(a), Error::Config(b)) => a == b,
            (Error::Executor(a), Error::Executor(b)) => a == b,
            (Error::External(a), Error::External(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::external(err)
    }
}

/// Several task failures bundled into one error.
///
/// Built through [`AggregateError::collapse`], which never produces an
/// aggregate of fewer than two errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{} tasks failed: {}", .errors.len(), joined(.errors))]
pub struct AggregateError {
    errors: Vec<Error>,
}

impl AggregateError {
    /// Folds `errors` into a single error: `None` when empty, the error
    /// itself when there is exactly one, an aggregate otherwise.
    pub fn collapse(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Aggregate(AggregateError { errors })),
        }
    }

    /// The errors in the order the tasks were supplied.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Iterates over the errors.
    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.errors.iter()
    }

    /// Number of errors; at least two.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Always `false` for an aggregate built by `collapse`.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Takes the errors out.
    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }
}

fn joined(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl<'a> IntoIterator for &'a AggregateError {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_empty() {
        assert!(AggregateError::collapse(Vec::new()).is_none());
    }

    #[test]
    fn test_collapse_single() {
        let err = Error::task_failed("boom");
        let collapsed = AggregateError::collapse(vec![err.clone()]).unwrap();
        assert_eq!(collapsed, err);
        assert!(collapsed.as_aggregate().is_none());
    }

    #[test]
    fn test_collapse_many_keeps_order() {
        let e1 = Error::task_failed("one");
        let e2 = Error::task_failed("two");
        let collapsed = AggregateError::collapse(vec![e1.clone(), e2.clone()]).unwrap();

        let agg = collapsed.as_aggregate().unwrap();
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.errors(), &[e1, e2]);
        assert_eq!(
            collapsed.to_string(),
            "2 tasks failed: task failed: one; task failed: two"
        );
    }

    #[test]
    fn test_external_errors_compare_by_identity() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        let same = io.clone();
        let other = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));

        assert_eq!(io, same);
        assert_ne!(io, other);
        assert_eq!(io.to_string(), "disk");
    }
}
