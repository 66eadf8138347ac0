// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rand::Rng;
use std::time::Duration;
use task_pipeline_core::{CompletionCounter, CompletionToken, FanIn, TaskId, TaskResult};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Emits `count` results tagged `(producer, seq)` and then reports completion.
fn spawn_producer(
    producer: u64,
    count: u64,
    capacity: usize,
    completion: CompletionToken,
) -> mpsc::Receiver<TaskResult<(u64, u64)>> {
    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(async move {
        for seq in 0..count {
            let delay = rand::rng().random_range(0..2u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let id = TaskId(producer * 1_000 + seq);
            if tx.send(TaskResult::success(id, (producer, seq))).await.is_err() {
                return;
            }
        }
        drop(tx);
        completion.complete();
    });
    rx
}

// ============================================================
// Merging
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_producers_ten_results_each() {
    let (done, tokens) = CompletionCounter::setup(2);
    let sources: Vec<_> = tokens
        .into_iter()
        .enumerate()
        .map(|(producer, token)| spawn_producer(producer as u64, 10, 2, token))
        .collect();

    let mut merged = FanIn::merge(sources, vec![done.clone()], 4);

    let mut received = Vec::new();
    while let Some(result) = timeout(WAIT, merged.recv()).await.expect("no hang") {
        assert!(
            received.len() < 20,
            "stream must close right after the 20th result"
        );
        received.push(*result.value().expect("success"));
    }

    assert_eq!(received.len(), 20);
    assert!(done.is_complete(), "close observed before every producer finished");
    assert_eq!(done.finished(), 2);

    // Interleaving is free, but each producer's own order is kept.
    for producer in 0..2 {
        let seqs: Vec<u64> = received
            .iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(seqs, (0..10).collect::<Vec<_>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_producers_every_result_delivered() {
    for producers in [1usize, 3, 8] {
        let (done, tokens) = CompletionCounter::setup(producers);
        let sources: Vec<_> = tokens
            .into_iter()
            .enumerate()
            .map(|(producer, token)| spawn_producer(producer as u64, 25, 1, token))
            .collect();

        let mut merged = FanIn::merge(sources, vec![done], 1);
        let mut count = 0;
        while timeout(WAIT, merged.recv()).await.expect("no hang").is_some() {
            count += 1;
        }

        assert_eq!(count, producers * 25);
    }
}

#[tokio::test]
async fn test_no_sources_closes_immediately() {
    let (done, _) = CompletionCounter::setup(0);
    let mut merged = FanIn::merge(Vec::<mpsc::Receiver<TaskResult<u32>>>::new(), vec![done], 1);

    let next = timeout(WAIT, merged.recv()).await.expect("no hang");
    assert!(next.is_none());
}

// ============================================================
// Exactly-once close
// ============================================================

#[tokio::test]
async fn test_close_waits_for_completion_barrier() {
    let (done, mut tokens) = CompletionCounter::setup(1);
    let token = tokens.pop().expect("one token");
    let (tx, rx) = mpsc::channel::<TaskResult<u32>>(1);

    let mut merged = FanIn::merge(vec![rx], vec![done.clone()], 1);

    tx.send(TaskResult::success(TaskId(0), 1))
        .await
        .expect("coordinator reading");
    drop(tx);

    let first = timeout(WAIT, merged.recv()).await.expect("no hang");
    assert_eq!(first.map(|r| r.task_id()), Some(TaskId(0)));

    // The data channel has ended, but the producer has not signalled yet.
    let early = timeout(Duration::from_millis(50), merged.recv()).await;
    assert!(early.is_err(), "merged stream closed before the barrier completed");
    assert!(!done.is_complete());

    token.complete();

    let closed = timeout(WAIT, merged.recv()).await.expect("closes after barrier");
    assert!(closed.is_none());
    assert!(done.is_complete());
}

#[tokio::test]
async fn test_closed_stream_stays_closed() {
    let (done, tokens) = CompletionCounter::setup(1);
    let sources: Vec<_> = tokens
        .into_iter()
        .map(|token| spawn_producer(0, 3, 1, token))
        .collect();

    let mut merged = FanIn::merge(sources, vec![done], 1);
    let mut count = 0;
    while timeout(WAIT, merged.recv()).await.expect("no hang").is_some() {
        count += 1;
    }

    assert_eq!(count, 3);
    for _ in 0..3 {
        assert!(merged.recv().await.is_none());
    }
}

#[tokio::test]
async fn test_dropped_consumer_unblocks_producers() {
    let (done, mut tokens) = CompletionCounter::setup(1);
    let token = tokens.pop().expect("one token");
    let (tx, rx) = mpsc::channel::<TaskResult<u32>>(1);

    let producer = tokio::spawn(async move {
        let mut sent = 0u64;
        while tx.send(TaskResult::success(TaskId(sent), 0)).await.is_ok() {
            sent += 1;
        }
        drop(token);
        sent
    });

    let mut merged = FanIn::merge(vec![rx], vec![done], 1);
    let _ = timeout(WAIT, merged.recv()).await.expect("first result");
    drop(merged);

    let sent = timeout(WAIT, producer)
        .await
        .expect("producer must not block forever")
        .expect("producer task");
    assert!(sent >= 1);
}
