// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{CompletionCounter, ResultStream, TaskResult};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::debug;

/// Merges many result streams into one.
pub struct FanIn;

impl FanIn {
    /// Spawns the coordinator that forwards every result of every source into
    /// the returned stream, in whatever order they arrive.
    ///
    /// The coordinator owns the only sender of the merged stream. It closes it
    /// once, after all sources have ended and every barrier in `done` has
    /// completed. Producers never close it themselves.
    ///
    /// If the returned stream is dropped, the coordinator stops and drops the
    /// sources, which unblocks any producer still writing to them.
    pub fn merge<O: Send + 'static>(
        sources: Vec<ResultStream<O>>,
        done: Vec<CompletionCounter>,
        capacity: usize,
    ) -> ResultStream<O> {
        let (merged, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(coordinate(sources, done, merged));
        rx
    }
}

async fn coordinate<O: Send + 'static>(
    sources: Vec<ResultStream<O>>,
    done: Vec<CompletionCounter>,
    merged: mpsc::Sender<TaskResult<O>>,
) {
    let mut streams = StreamMap::with_capacity(sources.len());
    for (source_id, source) in sources.into_iter().enumerate() {
        streams.insert(source_id, ReceiverStream::new(source));
    }

    let mut forwarded = 0usize;
    while let Some((source_id, result)) = streams.next().await {
        if merged.send(result).await.is_err() {
            debug!(source_id, forwarded, "merged stream dropped by consumer");
            return;
        }
        forwarded += 1;
    }

    for barrier in &done {
        barrier.wait_all().await;
    }

    debug!(forwarded, "all producers finished, closing merged stream");
    drop(merged);
}
