// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tuning knobs for a pipeline run. Missing fields in a config file take
/// their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Workers per stage.
    pub worker_count: usize,
    /// Capacity of the task channel feeding a stage.
    pub input_capacity: usize,
    /// Capacity of each worker's output and of the merged stream.
    pub output_capacity: usize,
    /// Deadline for the whole run. `None` runs until done or cancelled.
    pub timeout_ms: Option<u64>,
    /// How long a cancelled run keeps draining results that workers had
    /// already finished.
    pub grace_period_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            input_capacity: 16,
            output_capacity: 16,
            timeout_ms: None,
            grace_period_ms: 25,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| PipelineError::ConfigLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&contents).map_err(|e| match e {
            PipelineError::ConfigLoad { message, .. } => PipelineError::ConfigLoad {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_json(json: &str) -> PipelineResult<Self> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| PipelineError::ConfigLoad {
                path: "<inline>".to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.worker_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.input_capacity == 0 || self.output_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "channel capacities must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        // Rounded up to whole milliseconds, saturating at `u64::MAX`.
        self.timeout_ms = timeout.map(|t| {
            let partial = u128::from(t.subsec_nanos() % 1_000_000 != 0);
            u64::try_from(t.as_millis() + partial).unwrap_or(u64::MAX)
        });
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
