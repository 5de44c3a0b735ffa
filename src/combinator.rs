//! Aggregating many tasks into one.
//!
//! Both combinators observe their inputs one after another, in iteration
//! order: the outcome of task N+1 is looked at only once task N has settled.
//! The inputs themselves may already be running concurrently, e.g. on a
//! [`ParallelRunner`](crate::ParallelRunner).

use crate::error::{AggregateError, Error};
use crate::runner::RunnerHandle;
use crate::task::Task;
use parking_lot::Mutex;
use std::sync::Arc;

struct Gather<V> {
    values: Vec<V>,
    errors: Vec<Error>,
}

/// Completes once every task in `tasks` has completed.
///
/// On success the values come back in the order the tasks were supplied.
/// One failure is returned as is; several become an
/// [`Error::Aggregate`] holding them in supplied order.
pub fn when_all<T, I>(runner: &RunnerHandle, tasks: I) -> Task<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Task<T>>,
{
    fold(runner, tasks, |values: &mut Vec<T>, value| values.push(value))
}

/// Like [`when_all`] for tasks that each produce a batch; the batches are
/// concatenated in completion order.
pub fn merge<T, I>(runner: &RunnerHandle, tasks: I) -> Task<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Task<Vec<T>>>,
{
    fold(runner, tasks, |values: &mut Vec<T>, batch| values.extend(batch))
}

fn fold<T, V, I, F>(runner: &RunnerHandle, tasks: I, collect: F) -> Task<Vec<V>>
where
    T: Clone + Send + 'static,
    V: Clone + Send + 'static,
    I: IntoIterator<Item = Task<T>>,
    F: Fn(&mut Vec<V>, T) + Send + Sync + 'static,
{
    let gather = Arc::new(Mutex::new(Gather {
        values: Vec::new(),
        errors: Vec::new(),
    }));
    let collect = Arc::new(collect);

    let mut chain: Task<()> = Task::completed(runner, Ok(()));
    for task in tasks {
        let gather = gather.clone();
        let collect = collect.clone();
        let runner = runner.clone();

        chain = chain.then_async(move |()| {
            Ok(task.then_result_on(&runner, move |outcome| {
                let mut gather = gather.lock();
                match outcome {
                    Ok(value) => (*collect)(&mut gather.values, value),
                    Err(error) => gather.errors.push(error),
                }
                Ok(())
            }))
        });
    }

    chain.then(move |()| {
        let mut gather = gather.lock();
        match AggregateError::collapse(std::mem::take(&mut gather.errors)) {
            Some(error) => Err(error),
            None => Ok(std::mem::take(&mut gather.values)),
        }
    })
}
