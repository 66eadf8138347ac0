// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::sync::Arc;
use task_pipeline_core::{GateRegistry, PipelineResult};
use tracing::debug;

pub const ALPHABET_GATE: &str = "alphabet";
pub const LETTERS: usize = 26;

/// Byte-indexed table mapping ASCII letters of either case to a slot in
/// `0..LETTERS`.
#[derive(Debug)]
pub struct Alphabet {
    slots: [Option<u8>; 256],
}

impl Alphabet {
    pub fn build() -> Self {
        let mut slots = [None; 256];
        for (slot, letter) in (b'a'..=b'z').enumerate() {
            slots[letter as usize] = Some(slot as u8);
            slots[letter.to_ascii_uppercase() as usize] = Some(slot as u8);
        }
        Self { slots }
    }

    /// Table shared by every stage, built by whichever worker asks first.
    pub async fn shared(registry: &GateRegistry) -> PipelineResult<Arc<Self>> {
        registry
            .do_once(ALPHABET_GATE, || async {
                debug!("building alphabet table");
                Ok::<_, String>(Self::build())
            })
            .await
    }

    pub fn slot(&self, c: char) -> Option<usize> {
        if c.is_ascii() {
            self.slots[c as usize].map(usize::from)
        } else {
            None
        }
    }

    pub fn letter(slot: usize) -> char {
        (b'a' + slot as u8) as char
    }

    /// Lowercases letters and drops everything else.
    pub fn normalize(&self, raw: &str) -> String {
        raw.chars()
            .filter_map(|c| self.slot(c).map(Self::letter))
            .collect()
    }
}
