// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{Task, TaskError};
use std::future::Future;

/// Work applied by a worker to each task.
///
/// One instance is shared by every worker of a pool, so implementations must
/// tolerate concurrent calls with distinct tasks. A transform stops being
/// polled as soon as the pipeline is cancelled; it is not otherwise
/// interrupted.
pub trait Transform<I, O>: Send + Sync + 'static {
    fn apply(&self, task: Task<I>) -> impl Future<Output = Result<O, TaskError>> + Send;
}

impl<F, Fut, I, O> Transform<I, O> for F
where
    F: Fn(Task<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, TaskError>> + Send,
{
    fn apply(&self, task: Task<I>) -> impl Future<Output = Result<O, TaskError>> + Send {
        (self)(task)
    }
}
