// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{OnceGate, PipelineError, PipelineResult};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

type ErasedGate = Arc<dyn Any + Send + Sync>;

/// Set of once gates keyed by identifier, so several lazily initialized
/// resources can live side by side.
///
/// The registry is an ordinary value: construct it once and pass clones to
/// whoever needs the resources. Clones share the same gates.
#[derive(Clone, Default)]
pub struct GateRegistry {
    gates: Arc<Mutex<HashMap<String, ErasedGate>>>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, gate_id: &str) -> bool {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(gate_id)
    }

    /// Runs `initializer` the first time `gate_id` is requested and returns
    /// the shared value, or the recorded failure, to every caller.
    pub async fn do_once<T, F, Fut, E>(&self, gate_id: &str, initializer: F) -> PipelineResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let gate = self.gate::<T>(gate_id)?;
        let value = gate
            .do_once(move || async move { initializer().await.map(Arc::new) })
            .await?
            .clone();
        Ok(value)
    }

    fn gate<T: Send + Sync + 'static>(&self, gate_id: &str) -> PipelineResult<Arc<OnceGate<Arc<T>>>> {
        // The map lock is never held across an await; waiting happens on the gate.
        let erased = self
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(gate_id.to_string())
            .or_insert_with(|| Arc::new(OnceGate::<Arc<T>>::new(gate_id)) as ErasedGate)
            .clone();

        erased
            .downcast::<OnceGate<Arc<T>>>()
            .map_err(|_| PipelineError::GateTypeMismatch {
                gate: gate_id.to_string(),
            })
    }
}
