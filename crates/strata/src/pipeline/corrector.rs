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

use crate::pipeline::ValidationOutcome;
use crate::planner::extract_json_from_oracle_output;
use async_trait::async_trait;
use oracle_contracts::{GenerationOracle, GenerationRequest, PromptPurpose, PromptSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const CORRECTION_PROMPT: &str = r#"SYSTEM PROMPT:
You analyse why a generated artifact failed validation and produce a plan for
fixing it. You never rewrite the artifact yourself. Your ONLY output must be a
single, valid JSON object of the form:
{"error_category": "...", "fix_steps": ["..."], "guidance": "..."}

REJECTED ARTIFACT:
{artifact}

VALIDATION FEEDBACK:
{feedback}

BLOCKING ISSUES:
{issues}"#;

/// Structured output of failure analysis. Consumed as additional context by
/// the next generation call; the corrector never edits the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionPlan {
    pub error_category: String,
    #[serde(default)]
    pub fix_steps: Vec<String>,
    #[serde(default)]
    pub guidance: String,
}

impl CorrectionPlan {
    pub fn as_feedback(&self) -> String {
        let steps = self
            .fix_steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {step}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Error category: {}\nFix steps:\n{}\nGuidance: {}",
            self.error_category, steps, self.guidance
        )
    }

    fn fallback(outcome: &ValidationOutcome) -> Self {
        Self {
            error_category: "unclassified".to_string(),
            fix_steps: outcome.blocking_issues.clone(),
            guidance: outcome.feedback.clone(),
        }
    }
}

#[async_trait]
pub trait Corrector: Send + Sync {
    async fn analyse_failure(&self, artifact: &str, outcome: &ValidationOutcome)
        -> CorrectionPlan;
}

/// Default corrector: a generation call whose sole output is a correction
/// plan. Unparsable analysis degrades to a plan echoing the validator's own
/// findings.
pub struct OracleCorrector {
    oracle: Arc<dyn GenerationOracle>,
    oracle_timeout: Duration,
}

impl OracleCorrector {
    pub fn new(oracle: Arc<dyn GenerationOracle>, oracle_timeout: Duration) -> Self {
        Self {
            oracle,
            oracle_timeout,
        }
    }
}

#[async_trait]
impl Corrector for OracleCorrector {
    async fn analyse_failure(
        &self,
        artifact: &str,
        outcome: &ValidationOutcome,
    ) -> CorrectionPlan {
        let prompt_spec = PromptSpec::new(CORRECTION_PROMPT)
            .with_variable("artifact", artifact)
            .with_variable("feedback", &outcome.feedback)
            .with_variable("issues", outcome.blocking_issues.join("; "));
        let request = GenerationRequest::new(PromptPurpose::FailureAnalysis, prompt_spec);
        let response =
            match tokio::time::timeout(self.oracle_timeout, self.oracle.generate(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(error = %e, "Failure analysis oracle call failed, using fallback plan");
                    return CorrectionPlan::fallback(outcome);
                }
                Err(_) => {
                    warn!("Failure analysis timed out, using fallback plan");
                    return CorrectionPlan::fallback(outcome);
                }
            };
        extract_json_from_oracle_output(&response.content)
            .and_then(|json_str| serde_json::from_str::<CorrectionPlan>(&json_str).ok())
            .unwrap_or_else(|| {
                warn!("Failure analysis response unparsable, using fallback plan");
                CorrectionPlan::fallback(outcome)
            })
    }
}
