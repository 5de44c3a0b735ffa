//! Benchmarks for continuation chaining overhead

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use taskweave::prelude::*;

fn bench_manual_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("manual_chain");

    for length in [10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, &length| {
            let runner = ManualRunner::new();
            let handle = runner.handle();

            b.iter(|| {
                let mut task = handle.schedule(|| Ok(0usize)).unwrap();
                for _ in 0..length {
                    task = task.then(|x| Ok(black_box(x + 1)));
                }
                runner.block_on(&task).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_parallel_fan_out(c: &mut Criterion) {
    let runner = ParallelRunner::new();
    let handle = runner.handle();

    c.bench_function("parallel_when_all_16", |b| {
        b.iter(|| {
            let tasks: Vec<Task<usize>> = (0..16)
                .map(|i| handle.schedule(move || Ok(black_box(i * i))).unwrap())
                .collect();
            when_all(&handle, tasks).join().unwrap()
        });
    });

    runner.wait_idle();
}

fn bench_parallel_cascade(c: &mut Criterion) {
    let runner = ParallelRunner::new();
    let handle = runner.handle();

    c.bench_function("parallel_cascade_100", |b| {
        b.iter(|| {
            let task = handle
                .schedule(|| {
                    let current = taskweave::current_runner()?;
                    let mut task = Task::completed(&current, Ok(0usize));
                    for _ in 0..100 {
                        task = task.then(|x| Ok(black_box(x + 1)));
                    }
                    task.join()
                })
                .unwrap();
            task.join().unwrap()
        });
    });

    runner.wait_idle();
}

criterion_group!(
    benches,
    bench_manual_chain,
    bench_parallel_fan_out,
    bench_parallel_cascade
);
criterion_main!(benches);
