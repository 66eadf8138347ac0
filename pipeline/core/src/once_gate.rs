// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::InitializationError;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unstarted,
    Running,
    Done,
}

/// Runs an initializer exactly once, no matter how many callers race for it.
///
/// The outcome is recorded whether it succeeded or not: a failed
/// initialization is handed back to every later caller and never retried.
/// If the caller running the initializer is dropped mid-flight, one of the
/// waiting callers takes over with its own initializer.
#[derive(Debug)]
pub struct OnceGate<T> {
    name: String,
    started: AtomicBool,
    cell: OnceCell<Result<T, InitializationError>>,
}

impl<T> OnceGate<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: AtomicBool::new(false),
            cell: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> GateState {
        if self.cell.initialized() {
            GateState::Done
        } else if self.started.load(Ordering::Acquire) {
            GateState::Running
        } else {
            GateState::Unstarted
        }
    }

    /// Returns the recorded outcome without running anything.
    pub fn get(&self) -> Option<Result<&T, InitializationError>> {
        self.cell
            .get()
            .map(|outcome| outcome.as_ref().map_err(Clone::clone))
    }

    pub async fn do_once<F, Fut, E>(&self, initializer: F) -> Result<&T, InitializationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let outcome = self
            .cell
            .get_or_init(move || async move {
                self.started.store(true, Ordering::Release);
                debug!(gate = %self.name, "running initializer");
                match initializer().await {
                    Ok(value) => Ok(value),
                    Err(error) => {
                        warn!(gate = %self.name, %error, "initializer failed, recording failure");
                        Err(InitializationError {
                            gate: self.name.clone(),
                            message: error.to_string(),
                        })
                    }
                }
            })
            .await;

        outcome.as_ref().map_err(Clone::clone)
    }
}
