// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::alphabet::{Alphabet, LETTERS};
use std::collections::BTreeMap;
use task_pipeline_core::RunOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LetterCounts([u64; LETTERS]);

impl LetterCounts {
    pub fn add(&mut self, slot: usize) {
        self.0[slot] += 1;
    }

    pub fn get(&self, slot: usize) -> u64 {
        self.0[slot]
    }

    pub fn merge(&mut self, other: &LetterCounts) {
        for (total, count) in self.0.iter_mut().zip(other.0.iter()) {
            *total += count;
        }
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// Letters by descending count, ties broken alphabetically.
    pub fn ranked(&self) -> Vec<(char, u64)> {
        let mut ranked: Vec<(char, u64)> = self
            .0
            .iter()
            .enumerate()
            .map(|(slot, count)| (Alphabet::letter(slot), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }
}

/// Merged view of one run.
#[derive(Debug)]
pub struct Summary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failures: BTreeMap<String, usize>,
    pub counts: LetterCounts,
    pub stopped_early: Option<String>,
}

impl Summary {
    pub fn from_outcome(submitted: usize, outcome: &RunOutcome<LetterCounts>) -> Self {
        let mut counts = LetterCounts::default();
        let mut succeeded = 0;
        for value in outcome.values() {
            counts.merge(value);
            succeeded += 1;
        }

        let mut failures = BTreeMap::new();
        for failure in outcome.failures() {
            *failures.entry(failure.kind.clone()).or_insert(0) += 1;
        }

        Self {
            submitted,
            succeeded,
            failures,
            counts,
            stopped_early: outcome.error.as_ref().map(|e| e.to_string()),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.values().sum()
    }

    pub fn print(&self, top: usize) {
        println!("\n=== RESULTS ===");
        println!("Strings submitted: {}", self.submitted);
        println!("Strings counted:   {}", self.succeeded);
        println!("Strings rejected:  {}", self.failed());
        for (kind, count) in &self.failures {
            println!("  - {}: {}", kind, count);
        }
        if let Some(reason) = &self.stopped_early {
            println!("Run stopped early: {}", reason);
        }

        println!("\nTop letters:");
        for (letter, count) in self.counts.ranked().into_iter().take(top) {
            println!("{}: {}", letter, count);
        }
        println!("\nTotal letters counted: {}", self.counts.total());
    }

    pub fn to_json(&self) -> serde_json::Value {
        // `[letter, count]` pairs in rank order.
        let letters: Vec<serde_json::Value> = self
            .counts
            .ranked()
            .into_iter()
            .map(|(letter, count)| serde_json::json!([letter.to_string(), count]))
            .collect();

        serde_json::json!({
            "submitted": self.submitted,
            "succeeded": self.succeeded,
            "failures": self.failures,
            "letters": letters,
            "total_letters": self.counts.total(),
            "stopped_early": self.stopped_early,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_slotwise() {
        let mut a = LetterCounts::default();
        a.add(0);
        a.add(2);
        let mut b = LetterCounts::default();
        b.add(2);

        a.merge(&b);
        assert_eq!((a.get(0), a.get(1), a.get(2)), (1, 0, 2));
        assert_eq!(a.total(), 3);
    }

    #[test]
    fn test_ranked_orders_by_count_then_letter() {
        let mut counts = LetterCounts::default();
        counts.add(25);
        counts.add(25);
        counts.add(1);
        counts.add(0);

        let ranked = counts.ranked();
        assert_eq!(&ranked[..3], &[('z', 2), ('a', 1), ('b', 1)]);
        assert_eq!(ranked.len(), LETTERS);
    }

    #[test]
    fn test_json_letters_keep_ranking() {
        let mut counts = LetterCounts::default();
        counts.add(25);
        counts.add(25);
        counts.add(1);
        let summary = Summary {
            submitted: 2,
            succeeded: 2,
            failures: BTreeMap::new(),
            counts,
            stopped_early: None,
        };

        let json = summary.to_json();
        let letters = json["letters"].as_array().expect("letters array");
        assert_eq!(letters.len(), LETTERS);
        assert_eq!(letters[0], serde_json::json!(["z", 2]));
        assert_eq!(letters[1], serde_json::json!(["b", 1]));
        assert_eq!(letters[2], serde_json::json!(["a", 0]));
        assert_eq!(json["total_letters"], 3);
    }
}
