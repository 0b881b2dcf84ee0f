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

use crate::planner::extract_json_from_oracle_output;
use crate::planner::graph::TaskGraph;
use oracle_contracts::{GenerationOracle, GenerationRequest, PromptPurpose, PromptSpec};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const ASSESSMENT_PROMPT: &str = r#"SYSTEM PROMPT:
You review a decomposition of an analytical question into sub-questions and
judge whether the plan covers every intent of the original goal. Your ONLY
output must be a single, valid JSON object of the form:
{"complete": true, "missing_intents": [], "feedback": ""}

When the plan is incomplete, list each missing intent and write actionable
feedback for regenerating the plan.

ORIGINAL GOAL:
{goal}

PROPOSED PLAN:
{plan}"#;

#[derive(Debug, Clone, Deserialize)]
pub struct CoverageAssessment {
    pub complete: bool,
    #[serde(default)]
    pub missing_intents: Vec<String>,
    #[serde(default)]
    pub feedback: String,
}

impl CoverageAssessment {
    fn assumed_complete() -> Self {
        Self {
            complete: true,
            missing_intents: Vec::new(),
            feedback: String::new(),
        }
    }
}

/// Validates decomposition completeness against the original goal. An
/// unusable oracle response is treated as "complete": assessment exists to
/// improve plans, never to block them.
pub struct Assessor {
    oracle: Arc<dyn GenerationOracle>,
    oracle_timeout: Duration,
}

impl Assessor {
    pub fn new(oracle: Arc<dyn GenerationOracle>, oracle_timeout: Duration) -> Self {
        Self {
            oracle,
            oracle_timeout,
        }
    }

    pub async fn assess(&self, graph: &TaskGraph) -> CoverageAssessment {
        let plan_summary = graph
            .tasks()
            .iter()
            .map(|t| {
                format!(
                    "- {} [{}] depends on [{}]: {}",
                    t.id,
                    t.intent,
                    t.dependencies.join(", "),
                    t.question
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt_spec = PromptSpec::new(ASSESSMENT_PROMPT)
            .with_variable("goal", &graph.goal)
            .with_variable("plan", plan_summary);
        let request = GenerationRequest::new(PromptPurpose::CoverageAssessment, prompt_spec);

        let response =
            match tokio::time::timeout(self.oracle_timeout, self.oracle.generate(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(error = %e, "Coverage assessment oracle call failed, assuming complete");
                    return CoverageAssessment::assumed_complete();
                }
                Err(_) => {
                    warn!("Coverage assessment timed out, assuming complete");
                    return CoverageAssessment::assumed_complete();
                }
            };

        debug!(response = %response.content, "Received raw assessment response");
        let parsed = extract_json_from_oracle_output(&response.content)
            .and_then(|json_str| serde_json::from_str::<CoverageAssessment>(&json_str).ok());
        match parsed {
            Some(assessment) => assessment,
            None => {
                warn!("Coverage assessment response unparsable, assuming complete");
                CoverageAssessment::assumed_complete()
            }
        }
    }
}
