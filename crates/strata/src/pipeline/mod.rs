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

pub mod corrector;
pub mod stage;
pub mod validators;

pub use corrector::{CorrectionPlan, Corrector, OracleCorrector};
pub use stage::{PipelineStage, StageInput};
pub use validators::{InterpretationValidator, SqlArtifactValidator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verdict of a per-stage validation policy. An artifact is valid exactly
/// when no blocking issue is present; the score is advisory diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub score: f64,
    pub feedback: String,
    pub blocking_issues: Vec<String>,
}

impl ValidationOutcome {
    pub fn passed(score: f64) -> Self {
        Self {
            valid: true,
            score,
            feedback: String::new(),
            blocking_issues: Vec::new(),
        }
    }

    pub fn from_issues(score: f64, blocking_issues: Vec<String>, feedback: String) -> Self {
        Self {
            valid: blocking_issues.is_empty(),
            score,
            feedback,
            blocking_issues,
        }
    }
}

/// Validation policy injected into a [`PipelineStage`]. Never mutates the
/// artifact it inspects.
pub trait ArtifactValidator: Send + Sync {
    fn validate(&self, artifact: &str, input: &StageInput) -> ValidationOutcome;
}

/// One iteration of a pipeline stage's retry loop. Append-only history:
/// created at iteration start, read by the next iteration, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub stage_name: String,
    pub input: String,
    pub output: String,
    pub validation: ValidationOutcome,
    pub correction: Option<CorrectionPlan>,
    pub timestamp: DateTime<Utc>,
}

/// Terminal value of a pipeline stage run. `exhausted` marks a degraded but
/// usable artifact, not a hard failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub succeeded: bool,
    pub final_artifact: String,
    pub final_validation: ValidationOutcome,
    pub attempts_used: u32,
    pub exhausted: bool,
    pub history: Vec<Attempt>,
}
