//! Confidence voting over repeated OCR results
//!
//! Each OCR call casts one vote for the string it produced. A string wins
//! once its vote count reaches the configured confidence; the table is then
//! cleared so the next attempt starts from zero evidence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// How much agreement is required before a result is trusted
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionReliability {
    Raw,
    Tentative,
    #[default]
    Verifiable,
    Stable,
    Solid,
}

impl RecognitionReliability {
    /// Matching OCR results required to declare a winner
    pub fn number_of_results(&self) -> u64 {
        match self {
            RecognitionReliability::Raw => 1,
            RecognitionReliability::Tentative => 2,
            RecognitionReliability::Verifiable => 3,
            RecognitionReliability::Stable => 5,
            RecognitionReliability::Solid => 8,
        }
    }
}

/// Occurrence counts per candidate value
#[derive(Debug, Clone)]
pub struct RecognitionQueue<T: Eq + Hash> {
    values: HashMap<T, u64>,
    desired_confidence: u64,
}

impl<T: Eq + Hash> RecognitionQueue<T> {
    pub fn new(desired_confidence: u64) -> Self {
        Self {
            values: HashMap::new(),
            desired_confidence,
        }
    }

    pub fn from_reliability(reliability: RecognitionReliability) -> Self {
        Self::new(reliability.number_of_results())
    }

    /// Cast one vote for `value`
    pub fn enqueue(&mut self, value: T) {
        *self.values.entry(value).or_insert(0) += 1;
    }

    /// The most frequent candidate, if its count is at least `confidence`.
    /// Which of several equally frequent candidates is returned is unspecified.
    pub fn recognized_value_at(&self, confidence: u64) -> Option<&T> {
        self.values
            .iter()
            .max_by_key(|(_, count)| **count)
            .filter(|(_, count)| **count >= confidence)
            .map(|(value, _)| value)
    }

    /// Winner at the configured confidence
    pub fn recognized_value(&self) -> Option<&T> {
        self.recognized_value_at(self.desired_confidence)
    }

    /// Drop all votes
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn count(&self, value: &T) -> u64 {
        self.values.get(value).copied().unwrap_or(0)
    }

    /// Number of distinct candidates
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn desired_confidence(&self) -> u64 {
        self.desired_confidence
    }
}
