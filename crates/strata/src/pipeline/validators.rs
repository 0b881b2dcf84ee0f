// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::pipeline::{ArtifactValidator, StageInput, ValidationOutcome};

/// Checks that a delimiter pair is balanced and never dips negative.
pub(crate) fn balanced_delimiters(text: &str, open: char, close: char) -> bool {
    let mut depth: i64 = 0;
    let mut in_single = false;
    let mut in_double = false;
    for c in text.chars() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            c if c == open && !in_single && !in_double => depth += 1,
            c if c == close && !in_single && !in_double => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_single && !in_double
}

pub(crate) fn balanced_quotes(text: &str, quote: char) -> bool {
    text.chars().filter(|&c| c == quote).count() % 2 == 0
}

/// Validation policy for generated query artifacts. The artifact stays
/// opaque beyond basic well-formedness: shape checks only, no SQL semantics.
#[derive(Debug, Default)]
pub struct SqlArtifactValidator {
    _private: (),
}

impl SqlArtifactValidator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactValidator for SqlArtifactValidator {
    fn validate(&self, artifact: &str, _input: &StageInput) -> ValidationOutcome {
        let trimmed = artifact.trim();
        let mut blocking = Vec::new();
        let mut advisories = Vec::new();

        if trimmed.is_empty() {
            blocking.push("Artifact is empty".to_string());
        } else {
            if !balanced_delimiters(trimmed, '(', ')') {
                blocking.push("Unbalanced parentheses".to_string());
            }
            if !balanced_quotes(trimmed, '\'') {
                blocking.push("Unbalanced single quotes".to_string());
            }
            if !balanced_quotes(trimmed, '"') {
                blocking.push("Unbalanced double quotes".to_string());
            }
            let upper = trimmed.to_uppercase();
            if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
                blocking.push("Artifact is not a read-only query statement".to_string());
            }
            if trimmed.contains("```") {
                advisories.push("Artifact still contains markdown fencing".to_string());
            }
        }

        let score = 1.0 - 0.25 * (blocking.len() + advisories.len()) as f64;
        let feedback = blocking
            .iter()
            .chain(advisories.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join("; ");
        ValidationOutcome::from_issues(score.clamp(0.0, 1.0), blocking, feedback)
    }
}

/// Validation policy for the final interpretation. Blocks empty answers and
/// leaked internal error text; goal coverage only moves the advisory score.
#[derive(Debug)]
pub struct InterpretationValidator {
    min_length: usize,
}

impl InterpretationValidator {
    pub fn new() -> Self {
        Self { min_length: 20 }
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }
}

impl Default for InterpretationValidator {
    fn default() -> Self {
        Self::new()
    }
}

const LEAK_MARKERS: [&str; 5] = [
    "Traceback",
    "stack trace",
    "panicked at",
    "Exception:",
    "SQLSTATE",
];

impl ArtifactValidator for InterpretationValidator {
    fn validate(&self, artifact: &str, input: &StageInput) -> ValidationOutcome {
        let trimmed = artifact.trim();
        let mut blocking = Vec::new();

        if trimmed.is_empty() {
            blocking.push("Answer is empty".to_string());
        } else if trimmed.chars().count() < self.min_length {
            blocking.push(format!(
                "Answer is too short to be useful (minimum {} characters)",
                self.min_length
            ));
        }
        for marker in LEAK_MARKERS {
            if trimmed.contains(marker) {
                blocking.push(format!("Answer leaks internal error text ('{marker}')"));
            }
        }

        // Advisory only: how many substantive goal terms the answer echoes.
        let goal_terms: Vec<String> = input
            .question
            .split_whitespace()
            .filter(|w| w.len() > 4)
            .map(|w| w.to_lowercase())
            .collect();
        let answer_lower = trimmed.to_lowercase();
        let covered = goal_terms
            .iter()
            .filter(|term| answer_lower.contains(*term))
            .count();
        let coverage = if goal_terms.is_empty() {
            1.0
        } else {
            covered as f64 / goal_terms.len() as f64
        };

        let score = if blocking.is_empty() {
            (0.5 + 0.5 * coverage).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let feedback = blocking.join("; ");
        ValidationOutcome::from_issues(score, blocking, feedback)
    }
}
