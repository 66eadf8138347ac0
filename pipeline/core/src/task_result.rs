// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::TaskId;
use serde::{Deserialize, Serialize};

/// Failure reported by a transform for a single task.
///
/// `kind` is a short machine-readable category chosen by the transform,
/// `message` is free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    pub kind: String,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Wraps any error under the given kind.
    pub fn from_error(kind: impl Into<String>, error: &dyn std::error::Error) -> Self {
        Self::new(kind, error.to_string())
    }
}

/// A task's failure as seen by the caller: the transform's error tagged with
/// the task it came from. Carried as data inside a [`TaskResult`], never
/// returned across the pipeline boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{task_id} failed with {kind}: {message}")]
pub struct TransformError {
    pub task_id: TaskId,
    pub kind: String,
    pub message: String,
}

impl TransformError {
    pub fn new(task_id: TaskId, cause: TaskError) -> Self {
        Self {
            task_id,
            kind: cause.kind,
            message: cause.message,
        }
    }
}

/// Outcome of processing one task. Exactly one is produced per task that ran
/// to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult<O> {
    task_id: TaskId,
    outcome: Result<O, TransformError>,
}

impl<O> TaskResult<O> {
    pub fn success(task_id: TaskId, value: O) -> Self {
        Self {
            task_id,
            outcome: Ok(value),
        }
    }

    pub fn failure(task_id: TaskId, cause: TaskError) -> Self {
        Self {
            task_id,
            outcome: Err(TransformError::new(task_id, cause)),
        }
    }

    pub(crate) fn from_transform(task_id: TaskId, outcome: Result<O, TaskError>) -> Self {
        match outcome {
            Ok(value) => Self::success(task_id, value),
            Err(cause) => Self::failure(task_id, cause),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&O> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&TransformError> {
        self.outcome.as_ref().err()
    }

    pub fn into_outcome(self) -> Result<O, TransformError> {
        self.outcome
    }

    /// Re-types a failed result so it can join a later stage's output.
    /// Returns the value back when the result is a success.
    pub(crate) fn retype_failure<P>(self) -> Result<O, TaskResult<P>> {
        match self.outcome {
            Ok(value) => Ok(value),
            Err(error) => Err(TaskResult {
                task_id: self.task_id,
                outcome: Err(error),
            }),
        }
    }
}
