// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use task_pipeline_core::{
    CancelToken, PipelineError, ResultStream, Task, TaskError, TaskId, TaskResult, TaskSource,
    WorkerExit, WorkerPool,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn double(task: Task<u64>) -> Result<u64, TaskError> {
    Ok(task.into_input() * 2)
}

async fn drain<O>(mut outputs: Vec<ResultStream<O>>) -> Vec<TaskResult<O>> {
    let mut results = Vec::new();
    for output in outputs.iter_mut() {
        while let Some(result) = output.recv().await {
            results.push(result);
        }
    }
    results
}

fn submit(tasks: Vec<Task<u64>>, capacity: usize) -> TaskSource<u64> {
    let (tx, source) = TaskSource::channel(capacity);
    tokio::spawn(async move {
        for task in tasks {
            if tx.send(task).await.is_err() {
                return;
            }
        }
    });
    source
}

// ============================================================
// Normal operation
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_task_processed_by_exactly_one_worker() {
    let token = CancelToken::new(None);
    let source = submit(Task::batch(0..100u64), 8);

    // Output capacity covers the whole batch so draining one worker at a
    // time cannot stall the others.
    let pool = WorkerPool::start("test", 4, 100, source, Arc::new(|task: Task<u64>| async move {
        let delay = rand::rng().random_range(0..3u64);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok::<_, TaskError>(task.into_input())
    }), token.signal())
    .expect("pool starts");
    assert_eq!(pool.worker_count(), 4);

    let (outputs, done, workers) = pool.split();
    let results = timeout(WAIT, drain(outputs)).await.expect("outputs close");

    let mut ids: Vec<u64> = results.iter().map(|r| r.task_id().0).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..100).collect::<Vec<_>>());

    timeout(WAIT, done.wait_all()).await.expect("pool done");
    assert_eq!(done.finished(), 4);

    let exits = workers.join().await.expect("no worker failed");
    assert!(exits.iter().all(|exit| *exit == WorkerExit::Drained));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_merged_pool_output_closes_after_all_results() {
    let token = CancelToken::new(None);
    let source = submit(Task::batch(0..20u64), 4);

    let pool = WorkerPool::start("test", 3, 2, source, Arc::new(double), token.signal())
        .expect("pool starts");
    let done = pool.done();
    let (mut merged, _workers) = pool.merge(4);

    let mut values = Vec::new();
    while let Some(result) = timeout(WAIT, merged.recv()).await.expect("no hang") {
        values.push(*result.value().expect("success"));
    }
    values.sort_unstable();

    assert_eq!(values, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    assert!(done.is_complete(), "close must happen after every worker finished");
}

#[tokio::test]
async fn test_transform_failures_are_results() {
    let token = CancelToken::new(None);
    let source = submit(Task::batch(0..6u64), 6);

    let pool = WorkerPool::start(
        "test",
        2,
        6,
        source,
        Arc::new(|task: Task<u64>| async move {
            let value = task.into_input();
            if value % 2 == 1 {
                Err(TaskError::new("odd", format!("{value} is odd")))
            } else {
                Ok(value)
            }
        }),
        token.signal(),
    )
    .expect("pool starts");

    let (merged, _workers) = pool.merge(6);
    let results = timeout(WAIT, drain(vec![merged])).await.expect("closes");

    assert_eq!(results.len(), 6);
    let mut failed: Vec<TaskId> = results
        .iter()
        .filter_map(|r| r.error())
        .map(|e| {
            assert_eq!(e.kind, "odd");
            e.task_id
        })
        .collect();
    failed.sort();
    assert_eq!(failed, vec![TaskId(1), TaskId(3), TaskId(5)]);
}

#[tokio::test]
async fn test_zero_workers_rejected() {
    let token = CancelToken::new(None);
    let (_tx, source) = TaskSource::<u64>::channel(1);

    let result = WorkerPool::<u64>::start("empty", 0, 1, source, Arc::new(double), token.signal());

    assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
}

// ============================================================
// Back-pressure
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_output_stops_worker_taking_tasks() {
    let token = CancelToken::new(None);
    let taken = Arc::new(AtomicUsize::new(0));
    let source = submit(Task::batch(0..5u64), 5);

    let counter = taken.clone();
    let pool = WorkerPool::start(
        "test",
        1,
        1,
        source,
        Arc::new(move |task: Task<u64>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, TaskError>(task.into_input()) }
        }),
        token.signal(),
    )
    .expect("pool starts");
    let (mut outputs, _done, _workers) = pool.split();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        taken.load(Ordering::SeqCst),
        1,
        "worker must block on its full output before taking the next task"
    );

    let first = timeout(WAIT, outputs[0].recv()).await.expect("result ready");
    assert_eq!(first.map(|r| r.task_id()), Some(TaskId(0)));

    let rest = timeout(WAIT, drain(outputs)).await.expect("closes");
    assert_eq!(rest.len(), 4);
    assert_eq!(taken.load(Ordering::SeqCst), 5);
}

// ============================================================
// Cancellation and shutdown
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_abandons_in_flight_tasks() {
    let token = CancelToken::new(None);
    let started = Arc::new(AtomicUsize::new(0));
    let source = submit(Task::batch(0..10u64), 10);

    let counter = started.clone();
    let pool = WorkerPool::start(
        "test",
        3,
        4,
        source,
        Arc::new(move |_task: Task<u64>| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<u64, TaskError>>()
        }),
        token.signal(),
    )
    .expect("pool starts");
    let (outputs, done, workers) = pool.split();

    timeout(WAIT, async {
        while started.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("every worker picks up a task");

    token.cancel();

    let exits = timeout(WAIT, workers.join())
        .await
        .expect("workers exit after cancellation")
        .expect("no worker failed");
    assert!(exits.iter().all(|exit| *exit == WorkerExit::Cancelled));
    assert!(done.is_complete());
    assert_eq!(started.load(Ordering::SeqCst), 3, "no new task after cancellation");
    assert!(drain(outputs).await.is_empty());
}

#[tokio::test]
async fn test_dropped_outputs_release_workers() {
    let token = CancelToken::new(None);
    let (_tx, source) = TaskSource::<u64>::channel(1);

    let pool = WorkerPool::start("test", 2, 1, source, Arc::new(double), token.signal())
        .expect("pool starts");
    let (outputs, done, workers) = pool.split();

    drop(outputs);

    let exits = timeout(WAIT, workers.join())
        .await
        .expect("workers exit once nobody reads")
        .expect("no worker failed");
    assert_eq!(exits, vec![WorkerExit::ConsumerGone, WorkerExit::ConsumerGone]);
    assert!(done.is_complete());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_worker_reported_and_still_counted() {
    let token = CancelToken::new(None);
    let source = submit(Task::batch(0..4u64), 4);

    let pool = WorkerPool::start(
        "test",
        2,
        4,
        source,
        Arc::new(|task: Task<u64>| async move {
            if task.id() == TaskId(2) {
                panic!("transform exploded");
            }
            Ok::<_, TaskError>(task.into_input())
        }),
        token.signal(),
    )
    .expect("pool starts");
    let (outputs, done, workers) = pool.split();

    let results = timeout(WAIT, drain(outputs)).await.expect("outputs close");
    assert_eq!(results.len(), 3);

    timeout(WAIT, done.wait_all())
        .await
        .expect("a panicked worker still completes the barrier");

    match workers.join().await {
        Err(PipelineError::WorkerFailed { message, .. }) => {
            assert!(message.contains("test"))
        }
        other => panic!("Expected WorkerFailed, got {:?}", other),
    }
}
