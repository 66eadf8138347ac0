// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{
    CancelSignal, CompletionCounter, CompletionToken, FanIn, PipelineError, PipelineResult,
    TaskResult, TaskSource, Transform,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, warn, Instrument};

/// Bounded stream of results produced by one producer.
pub type ResultStream<O> = mpsc::Receiver<TaskResult<O>>;

/// Why a worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Input closed and drained.
    Drained,
    /// The cancellation signal fired.
    Cancelled,
    /// Nobody reads the worker's output any more.
    ConsumerGone,
}

/// Fixed-size set of workers pulling from one [`TaskSource`].
///
/// Every worker owns its output channel and its completion token; the pool
/// itself never closes anything. Merge the outputs with [`FanIn`].
pub struct WorkerPool<O> {
    outputs: Vec<ResultStream<O>>,
    done: CompletionCounter,
    workers: PoolWorkers,
}

impl<O: Send + 'static> WorkerPool<O> {
    /// Launches exactly `worker_count` workers.
    ///
    /// Must be called within a tokio runtime.
    pub fn start<I, Tr>(
        name: &'static str,
        worker_count: usize,
        output_capacity: usize,
        input: TaskSource<I>,
        transform: Arc<Tr>,
        signal: CancelSignal,
    ) -> PipelineResult<Self>
    where
        I: Send + 'static,
        Tr: Transform<I, O>,
    {
        if worker_count == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "pool '{name}' needs at least one worker"
            )));
        }
        if output_capacity == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "pool '{name}' needs a non-zero output capacity"
            )));
        }

        let (done, tokens) = CompletionCounter::setup(worker_count);
        let mut outputs = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);

        for completion in tokens {
            let worker_id = completion.producer_id();
            let (tx, rx) = mpsc::channel(output_capacity);
            let worker = Worker {
                id: worker_id,
                input: input.clone(),
                transform: transform.clone(),
                output: tx,
                signal: signal.clone(),
                completion,
            };
            let span = debug_span!("worker", pool = name, worker_id);
            handles.push(tokio::spawn(worker.run().instrument(span)));
            outputs.push(rx);
        }

        debug!(pool = name, worker_count, "worker pool started");

        Ok(Self {
            outputs,
            done,
            workers: PoolWorkers {
                name,
                handles,
            },
        })
    }

    pub fn worker_count(&self) -> usize {
        self.done.expected()
    }

    /// Completion barrier of the pool's workers.
    pub fn done(&self) -> CompletionCounter {
        self.done.clone()
    }

    /// Hands out the per-worker outputs, the completion barrier and the
    /// worker handles separately.
    pub fn split(self) -> (Vec<ResultStream<O>>, CompletionCounter, PoolWorkers) {
        (self.outputs, self.done, self.workers)
    }

    /// Merges all worker outputs into one stream, closed once every worker
    /// has exited.
    pub fn merge(self, capacity: usize) -> (ResultStream<O>, PoolWorkers) {
        let (outputs, done, workers) = self.split();
        (FanIn::merge(outputs, vec![done], capacity), workers)
    }
}

/// Join handles of a pool's workers. Dropping this detaches the workers; they
/// still exit on their own once cancelled or once their output is dropped.
pub struct PoolWorkers {
    name: &'static str,
    handles: Vec<JoinHandle<WorkerExit>>,
}

impl PoolWorkers {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker and reports the first abnormal termination.
    pub async fn join(self) -> PipelineResult<Vec<WorkerExit>> {
        let mut exits = Vec::with_capacity(self.handles.len());
        let mut failure = None;

        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            match handle.await {
                Ok(exit) => exits.push(exit),
                Err(e) => {
                    warn!(pool = self.name, worker_id, error = %e, "worker task failed");
                    if failure.is_none() {
                        failure = Some(PipelineError::WorkerFailed {
                            worker_id,
                            message: format!("{}: {}", self.name, e),
                        });
                    }
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(exits),
        }
    }
}

struct Worker<I, O, Tr> {
    id: usize,
    input: TaskSource<I>,
    transform: Arc<Tr>,
    output: mpsc::Sender<TaskResult<O>>,
    signal: CancelSignal,
    completion: CompletionToken,
}

impl<I, O, Tr> Worker<I, O, Tr>
where
    I: Send + 'static,
    O: Send + 'static,
    Tr: Transform<I, O>,
{
    async fn run(self) -> WorkerExit {
        let Worker {
            id,
            input,
            transform,
            output,
            signal,
            completion,
        } = self;
        let mut processed = 0usize;

        let exit = loop {
            // Output capacity first: with a full output the worker must not
            // take another task.
            let permit = tokio::select! {
                biased;
                _ = signal.wait_done() => break WorkerExit::Cancelled,
                permit = output.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break WorkerExit::ConsumerGone,
                },
            };

            let task = tokio::select! {
                biased;
                _ = signal.wait_done() => break WorkerExit::Cancelled,
                _ = output.closed() => break WorkerExit::ConsumerGone,
                task = input.next() => match task {
                    Some(task) => task,
                    None => break WorkerExit::Drained,
                },
            };

            let task_id = task.id();
            let outcome = tokio::select! {
                biased;
                _ = signal.wait_done() => {
                    debug!(%task_id, "abandoning in-flight task");
                    break WorkerExit::Cancelled;
                }
                _ = output.closed() => break WorkerExit::ConsumerGone,
                outcome = transform.apply(task) => outcome,
            };

            if let Err(e) = &outcome {
                debug!(%task_id, error = %e, "transform failed");
            }
            permit.send(TaskResult::from_transform(task_id, outcome));
            processed += 1;
        };

        debug!(worker_id = id, processed, ?exit, "worker exited");
        drop(output);
        completion.complete();
        exit
    }
}
