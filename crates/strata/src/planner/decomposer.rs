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

use crate::errors::DecompositionError;
use crate::planner::graph::{TaskGraph, TaskSpec};
use crate::planner::extract_json_from_oracle_output;
use oracle_contracts::{GenerationOracle, GenerationRequest, PromptPurpose, PromptSpec};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DECOMPOSITION_PROMPT: &str = r#"SYSTEM PROMPT:
You are an expert analyst that breaks a natural language question into the
smallest set of answerable sub-questions. Your ONLY output must be a single,
valid JSON object of the form:
{"tasks": [{"id": "t1", "question": "...", "intent": "...", "dependencies": []}]}

**CRITICAL INSTRUCTIONS:**
1. A task's "dependencies" may only name tasks that appear EARLIER in the list.
2. Emit exactly one task when the question carries a single intent.
3. Each "intent" is a short label describing what the sub-question is for.
4. Do not include any other text, explanations, or markdown formatting.

CONVERSATION CONTEXT:
{context}

{feedback}

USER QUESTION:
{question}"#;

#[derive(Debug, Deserialize)]
struct DecompositionPlan {
    tasks: Vec<TaskSpec>,
}

/// Turns a question into a task graph via the oracle. Every failure path
/// degrades to a single-task graph holding the original question verbatim,
/// so the engine always makes forward progress.
pub struct Decomposer {
    oracle: Arc<dyn GenerationOracle>,
    oracle_timeout: Duration,
}

impl Decomposer {
    pub fn new(oracle: Arc<dyn GenerationOracle>, oracle_timeout: Duration) -> Self {
        Self {
            oracle,
            oracle_timeout,
        }
    }

    pub async fn decompose(
        &self,
        question: &str,
        context: &str,
        retry_feedback: Option<&str>,
    ) -> TaskGraph {
        match self.try_decompose(question, context, retry_feedback).await {
            Ok(graph) => {
                info!(
                    tasks = graph.len(),
                    "Decomposition produced a task graph"
                );
                graph
            }
            Err(e) => {
                warn!(error = %e, "Decomposition failed, falling back to single-task graph");
                TaskGraph::single(question, question)
            }
        }
    }

    async fn try_decompose(
        &self,
        question: &str,
        context: &str,
        retry_feedback: Option<&str>,
    ) -> Result<TaskGraph, DecompositionError> {
        let feedback_block = retry_feedback
            .map(|f| format!("FEEDBACK ON YOUR PREVIOUS PLAN:\n{f}"))
            .unwrap_or_default();
        let prompt_spec = PromptSpec::new(DECOMPOSITION_PROMPT)
            .with_variable("question", question)
            .with_variable("context", context)
            .with_variable("feedback", feedback_block);
        let request = GenerationRequest::new(PromptPurpose::Decomposition, prompt_spec);

        let response = tokio::time::timeout(self.oracle_timeout, self.oracle.generate(request))
            .await
            .map_err(|_| DecompositionError::Oracle("oracle call timed out".to_string()))?
            .map_err(|e| DecompositionError::Oracle(e.to_string()))?;

        debug!(response = %response.content, "Received raw decomposition response");
        let json_str = extract_json_from_oracle_output(&response.content)
            .ok_or(DecompositionError::JsonNotFoundInResponse)?;
        let plan: DecompositionPlan = serde_json::from_str(&json_str)?;
        if plan.tasks.iter().any(|t| t.question.trim().is_empty()) {
            return Err(DecompositionError::MalformedPlan(
                "plan contains a task with an empty question".to_string(),
            ));
        }
        TaskGraph::build(question, plan.tasks)
            .map_err(|e| DecompositionError::MalformedPlan(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::ScriptedOracle;

    fn decomposer(oracle: ScriptedOracle) -> Decomposer {
        Decomposer::new(Arc::new(oracle), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_parses_multi_task_plan() {
        let oracle = ScriptedOracle::new().with_script(
            PromptPurpose::Decomposition,
            r#"```json
{"tasks": [
  {"id": "t1", "question": "What is the engagement rate?", "intent": "measure", "dependencies": []},
  {"id": "t2", "question": "How can it improve?", "intent": "advise", "dependencies": ["t1"]}
]}
```"#,
        );
        let graph = decomposer(oracle)
            .decompose("What's my engagement rate and how should I improve it?", "", None)
            .await;
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("t2").unwrap().layer, 2);
    }

    #[tokio::test]
    async fn test_unparsable_output_falls_back_to_single_task() {
        let oracle =
            ScriptedOracle::new().with_script(PromptPurpose::Decomposition, "no json at all");
        let graph = decomposer(oracle)
            .decompose("What's my reach?", "", None)
            .await;
        assert!(graph.is_single_task());
        assert_eq!(graph.tasks()[0].question, "What's my reach?");
    }

    #[tokio::test]
    async fn test_forward_reference_plan_falls_back() {
        let oracle = ScriptedOracle::new().with_script(
            PromptPurpose::Decomposition,
            r#"{"tasks": [
  {"id": "t1", "question": "a", "intent": "x", "dependencies": ["t2"]},
  {"id": "t2", "question": "b", "intent": "y", "dependencies": []}
]}"#,
        );
        let graph = decomposer(oracle).decompose("original", "", None).await;
        assert!(graph.is_single_task());
        assert_eq!(graph.tasks()[0].question, "original");
    }

    #[tokio::test]
    async fn test_retry_feedback_is_threaded_into_prompt() {
        let oracle = ScriptedOracle::new()
            .with_script(PromptPurpose::Decomposition, r#"{"tasks": [{"id": "t1", "question": "q", "intent": "i", "dependencies": []}]}"#);
        let recorded = oracle.recorded_prompts();
        let d = decomposer(oracle);
        d.decompose("question", "ctx", Some("missing the spend intent"))
            .await;
        let prompts = recorded.lock().unwrap();
        assert!(prompts[0].contains("missing the spend intent"));
        assert!(prompts[0].contains("ctx"));
    }
}
