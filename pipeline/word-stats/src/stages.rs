// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::alphabet::Alphabet;
use crate::summary::LetterCounts;
use std::future::Future;
use task_pipeline_core::{GateRegistry, PipelineError, Task, TaskError, Transform};

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("no letters in {0:?}")]
    NoLetters(String),
    #[error("alphabet table unavailable: {0}")]
    Alphabet(#[from] PipelineError),
}

impl StageError {
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::NoLetters(_) => "no-letters",
            StageError::Alphabet(_) => "alphabet",
        }
    }
}

impl From<StageError> for TaskError {
    fn from(e: StageError) -> Self {
        TaskError::from_error(e.kind(), &e)
    }
}

/// Stage one: lowercase letters only. Strings without a single letter fail.
#[derive(Clone)]
pub struct Normalize {
    registry: GateRegistry,
}

impl Normalize {
    pub fn new(registry: GateRegistry) -> Self {
        Self { registry }
    }
}

impl Transform<String, String> for Normalize {
    fn apply(&self, task: Task<String>) -> impl Future<Output = Result<String, TaskError>> + Send {
        let registry = self.registry.clone();
        async move {
            let alphabet = Alphabet::shared(&registry).await.map_err(StageError::from)?;
            let raw = task.into_input();
            let normalized = alphabet.normalize(&raw);
            if normalized.is_empty() {
                return Err(StageError::NoLetters(raw).into());
            }
            Ok::<_, TaskError>(normalized)
        }
    }
}

/// Stage two: per-string letter histogram.
#[derive(Clone)]
pub struct CountLetters {
    registry: GateRegistry,
}

impl CountLetters {
    pub fn new(registry: GateRegistry) -> Self {
        Self { registry }
    }
}

impl Transform<String, LetterCounts> for CountLetters {
    fn apply(
        &self,
        task: Task<String>,
    ) -> impl Future<Output = Result<LetterCounts, TaskError>> + Send {
        let registry = self.registry.clone();
        async move {
            let alphabet = Alphabet::shared(&registry).await.map_err(StageError::from)?;
            let mut counts = LetterCounts::default();
            for slot in task.input().chars().filter_map(|c| alphabet.slot(c)) {
                counts.add(slot);
            }
            Ok::<_, TaskError>(counts)
        }
    }
}
