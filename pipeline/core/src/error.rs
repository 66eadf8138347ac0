// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::fmt;

/// Why a token stopped being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The owner (or an ancestor token) cancelled explicitly.
    Cancelled,
    /// The token's own deadline elapsed.
    Expired,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "cancelled"),
            CancelReason::Expired => write!(f, "deadline expired"),
        }
    }
}

/// A once-gate initializer failed. The failure is recorded by the gate and
/// handed back to every later caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("initializer for gate '{gate}' failed: {message}")]
pub struct InitializationError {
    pub gate: String,
    pub message: String,
}

/// Pipeline-level failures.
///
/// Per-task failures are not in here: they travel as data inside
/// [`TaskResult`](crate::TaskResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline {reason} after {completed} of {submitted} results")]
    Cancelled {
        completed: usize,
        submitted: usize,
        reason: CancelReason,
    },

    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error("gate '{gate}' is registered with a different value type")]
    GateTypeMismatch { gate: String },

    #[error("pipeline closed with {completed} of {submitted} results")]
    Incomplete { completed: usize, submitted: usize },

    #[error("worker {worker_id} terminated abnormally: {message}")]
    WorkerFailed { worker_id: usize, message: String },

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load configuration from '{path}': {message}")]
    ConfigLoad { path: String, message: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
