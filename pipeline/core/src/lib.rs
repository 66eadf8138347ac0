// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Bounded concurrent task pipeline.
//!
//! Tasks are fanned out to a fixed pool of workers and their results fanned
//! back in through one stream that is closed exactly once. A run can be
//! cancelled or time out at any point; it then returns the results completed
//! so far and never leaves a worker blocked.

mod task;
pub use task::{Task, TaskId};

mod task_result;
pub use task_result::{TaskError, TaskResult, TransformError};

mod error;
pub use error::{CancelReason, InitializationError, PipelineError, PipelineResult};

mod timer;
pub use timer::{Timer, TokioTimer};

mod cancellation;
pub use cancellation::{CancelSignal, CancelToken, TokenState};

mod once_gate;
pub use once_gate::{GateState, OnceGate};

mod gate_registry;
pub use gate_registry::GateRegistry;

mod completion_counter;
pub use completion_counter::{CompletionCounter, CompletionToken};

mod transform;
pub use transform::Transform;

mod task_source;
pub use task_source::TaskSource;

mod worker_pool;
pub use worker_pool::{PoolWorkers, ResultStream, WorkerExit, WorkerPool};

mod fan_in;
pub use fan_in::FanIn;

mod config;
pub use config::PipelineConfig;

mod orchestrator;
pub use orchestrator::{run_pipeline, Orchestrator, RunOutcome};
