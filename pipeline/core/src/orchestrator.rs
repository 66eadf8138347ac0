// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{
    CancelReason, CancelSignal, CancelToken, CompletionCounter, CompletionToken, FanIn,
    PipelineConfig, PipelineError, PipelineResult, PoolWorkers, ResultStream, Task, TaskResult,
    TaskSource, Transform, TransformError, WorkerPool,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What a run hands back: every result that completed, plus the pipeline-level
/// error if the run did not complete. Once a run has returned, no further
/// results can appear.
#[derive(Debug)]
pub struct RunOutcome<O> {
    pub results: Vec<TaskResult<O>>,
    pub error: Option<PipelineError>,
}

impl<O> RunOutcome<O> {
    fn failed(error: PipelineError) -> Self {
        Self {
            results: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Some(PipelineError::Cancelled { .. }))
    }

    pub fn values(&self) -> impl Iterator<Item = &O> {
        self.results.iter().filter_map(TaskResult::value)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransformError> {
        self.results.iter().filter_map(TaskResult::error)
    }

    pub fn into_result(self) -> PipelineResult<Vec<TaskResult<O>>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }
}

/// Runs `tasks` through `worker_count` workers applying `transform`, giving
/// up after `timeout` if one is set.
pub async fn run_pipeline<I, O, Tr>(
    tasks: Vec<Task<I>>,
    worker_count: usize,
    transform: Tr,
    timeout: Option<Duration>,
) -> RunOutcome<O>
where
    I: Send + 'static,
    O: Send + 'static,
    Tr: Transform<I, O>,
{
    let config = PipelineConfig::default()
        .with_workers(worker_count)
        .with_timeout(timeout);
    Orchestrator::new(config).run(tasks, transform).await
}

/// Wires token, pools and fan-in together for one or two stages.
///
/// Each run owns a fresh [`CancelToken`], armed with the configured timeout
/// and derived from the parent signal if one was given. The token is dropped,
/// and so cancelled, when the run returns: any worker still busy at that
/// point exits on its own.
pub struct Orchestrator {
    config: PipelineConfig,
    parent: Option<CancelSignal>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            parent: None,
        }
    }

    /// Ties every run to an outside signal, e.g. a Ctrl+C handler's token.
    pub fn with_parent(mut self, parent: CancelSignal) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn open_token(&self) -> CancelToken {
        match &self.parent {
            Some(parent) => CancelToken::child_of(parent, self.config.timeout()),
            None => CancelToken::new(self.config.timeout()),
        }
    }

    /// Single-stage run.
    pub async fn run<I, O, Tr>(&self, tasks: Vec<Task<I>>, transform: Tr) -> RunOutcome<O>
    where
        I: Send + 'static,
        O: Send + 'static,
        Tr: Transform<I, O>,
    {
        if let Err(e) = self.config.validate() {
            return RunOutcome::failed(e);
        }

        let submitted = tasks.len();
        let token = self.open_token();
        let signal = token.signal();
        info!(
            submitted,
            workers = self.config.worker_count,
            timeout_ms = ?self.config.timeout_ms,
            "pipeline started"
        );

        let source = TaskSource::from_tasks(tasks, self.config.input_capacity, signal.clone());
        let pool = match WorkerPool::start(
            "stage",
            self.config.worker_count,
            self.config.output_capacity,
            source,
            Arc::new(transform),
            signal,
        ) {
            Ok(pool) => pool,
            Err(e) => return RunOutcome::failed(e),
        };

        let (merged, workers) = pool.merge(self.config.output_capacity);
        self.collect(merged, vec![workers], submitted, &token).await
    }

    /// Two-stage run: every successful result of `first` becomes a task of
    /// `second` under the same id. Failures of `first` skip `second` and go
    /// straight to the output. Both stages share one token, so cancelling the
    /// run stops stage two from taking new work as well.
    pub async fn run_chained<I, M, O, T1, T2>(
        &self,
        tasks: Vec<Task<I>>,
        first: T1,
        second: T2,
    ) -> RunOutcome<O>
    where
        I: Send + 'static,
        M: Send + 'static,
        O: Send + 'static,
        T1: Transform<I, M>,
        T2: Transform<M, O>,
    {
        if let Err(e) = self.config.validate() {
            return RunOutcome::failed(e);
        }

        let submitted = tasks.len();
        let token = self.open_token();
        let signal = token.signal();
        info!(
            submitted,
            workers_per_stage = self.config.worker_count,
            timeout_ms = ?self.config.timeout_ms,
            "two-stage pipeline started"
        );

        let source = TaskSource::from_tasks(tasks, self.config.input_capacity, signal.clone());
        let first_pool = match WorkerPool::start(
            "first",
            self.config.worker_count,
            self.config.output_capacity,
            source,
            Arc::new(first),
            signal.clone(),
        ) {
            Ok(pool) => pool,
            Err(e) => return RunOutcome::failed(e),
        };
        let (first_merged, first_workers) = first_pool.merge(self.config.output_capacity);

        let (next_tx, next_source) = TaskSource::channel(self.config.input_capacity);
        let second_pool = match WorkerPool::start(
            "second",
            self.config.worker_count,
            self.config.output_capacity,
            next_source,
            Arc::new(second),
            signal.clone(),
        ) {
            Ok(pool) => pool,
            Err(e) => return RunOutcome::failed(e),
        };
        let (mut outputs, second_done, second_workers) = second_pool.split();

        let (bypass_tx, bypass_rx) = mpsc::channel(self.config.output_capacity);
        let (bridge_done, bridge_token) = CompletionCounter::single();
        tokio::spawn(bridge(first_merged, next_tx, bypass_tx, signal, bridge_token));
        outputs.push(bypass_rx);

        let merged = FanIn::merge(
            outputs,
            vec![second_done, bridge_done],
            self.config.output_capacity,
        );
        self.collect(merged, vec![first_workers, second_workers], submitted, &token)
            .await
    }

    async fn collect<O>(
        &self,
        mut merged: ResultStream<O>,
        workers: Vec<PoolWorkers>,
        submitted: usize,
        token: &CancelToken,
    ) -> RunOutcome<O> {
        let mut results = Vec::with_capacity(submitted);

        let closed = loop {
            tokio::select! {
                biased;
                result = merged.recv() => match result {
                    Some(result) => results.push(result),
                    None => break true,
                },
                _ = token.wait_done() => break false,
            }
        };

        if !closed {
            // Results that workers finished before noticing the cancellation
            // may still be in flight; wait for them, but not for long.
            let grace = self.config.grace_period();
            let drained = tokio::time::timeout(grace, async {
                while let Some(result) = merged.recv().await {
                    results.push(result);
                }
            })
            .await;
            if drained.is_err() {
                debug!(grace_ms = grace.as_millis() as u64, "grace period elapsed, abandoning workers");
            }
        }
        drop(merged);

        let completed = results.len();
        if completed == submitted {
            info!(completed, "pipeline finished");
            return RunOutcome {
                results,
                error: None,
            };
        }

        let error = if token.is_done() {
            let reason = token.state().reason().unwrap_or(CancelReason::Cancelled);
            warn!(completed, submitted, %reason, "pipeline stopped early");
            PipelineError::Cancelled {
                completed,
                submitted,
                reason,
            }
        } else {
            // The stream closed without cancellation but results are missing:
            // some worker died. Every worker has exited by now.
            match join_all(workers).await {
                Err(e) => e,
                Ok(()) => PipelineError::Incomplete {
                    completed,
                    submitted,
                },
            }
        };

        RunOutcome {
            results,
            error: Some(error),
        }
    }
}

async fn join_all(workers: Vec<PoolWorkers>) -> PipelineResult<()> {
    for pool in workers {
        pool.join().await?;
    }
    Ok(())
}

/// Feeds stage-one successes to stage two and routes stage-one failures
/// around it. Holds the bypass producer's completion token.
async fn bridge<M, O>(
    mut upstream: ResultStream<M>,
    next: mpsc::Sender<Task<M>>,
    bypass: mpsc::Sender<TaskResult<O>>,
    signal: CancelSignal,
    _done: CompletionToken,
) where
    M: Send + 'static,
    O: Send + 'static,
{
    let mut forwarded = 0usize;
    loop {
        let result = tokio::select! {
            biased;
            _ = signal.wait_done() => break,
            result = upstream.recv() => match result {
                Some(result) => result,
                None => break,
            },
        };

        let task_id = result.task_id();
        let delivered = match result.retype_failure::<O>() {
            Ok(value) => tokio::select! {
                biased;
                _ = signal.wait_done() => break,
                sent = next.send(Task::new(task_id, value)) => sent.is_ok(),
            },
            Err(failed) => tokio::select! {
                biased;
                _ = signal.wait_done() => break,
                sent = bypass.send(failed) => sent.is_ok(),
            },
        };
        if !delivered {
            break;
        }
        forwarded += 1;
    }
    debug!(forwarded, "stage bridge finished");
}
