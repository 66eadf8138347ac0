// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{CancelSignal, Task};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Receiving side of the bounded task channel, shared by all workers of a
/// pool. Each task is handed to exactly one worker.
#[derive(Debug)]
pub struct TaskSource<I> {
    rx: Arc<Mutex<mpsc::Receiver<Task<I>>>>,
}

impl<I> Clone for TaskSource<I> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<I: Send + 'static> TaskSource<I> {
    /// Creates a bounded task channel. The submitter keeps the sender; the
    /// source is closed once every sender is dropped and the buffer drained.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Task<I>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Spawns a submitter that feeds `tasks` into a fresh channel and closes
    /// it afterwards. The submitter gives up as soon as `signal` is done.
    pub fn from_tasks(tasks: Vec<Task<I>>, capacity: usize, signal: CancelSignal) -> Self {
        let (tx, source) = Self::channel(capacity);

        tokio::spawn(async move {
            let total = tasks.len();
            for (submitted, task) in tasks.into_iter().enumerate() {
                tokio::select! {
                    biased;
                    _ = signal.wait_done() => {
                        debug!(submitted, total, "submitter stopped by cancellation");
                        return;
                    }
                    sent = tx.send(task) => {
                        if sent.is_err() {
                            debug!(submitted, total, "task source dropped, submitter stopping");
                            return;
                        }
                    }
                }
            }
            debug!(total, "all tasks submitted, closing input");
        });

        source
    }

    /// Next task, or `None` once the channel is closed and drained.
    /// Cancel safe.
    pub async fn next(&self) -> Option<Task<I>> {
        self.rx.lock().await.recv().await
    }
}
