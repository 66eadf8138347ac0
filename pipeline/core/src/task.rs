// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier attached to every submitted task, used for tracing and to tag
/// the result produced for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One unit of input work.
///
/// A task is moved into exactly one worker; there is no shared access to its
/// payload once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task<I> {
    id: TaskId,
    input: I,
}

impl<I> Task<I> {
    pub fn new(id: TaskId, input: I) -> Self {
        Self { id, input }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn into_input(self) -> I {
        self.input
    }

    /// Numbers a batch of inputs sequentially, starting at zero.
    pub fn batch(inputs: impl IntoIterator<Item = I>) -> Vec<Task<I>> {
        inputs
            .into_iter()
            .enumerate()
            .map(|(idx, input)| Task::new(TaskId(idx as u64), input))
            .collect()
    }
}
