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

pub mod progress;

pub use progress::{EngineStage, NullSink, ProgressEvent, ProgressSink};

use crate::aggregator::aggregate;
use crate::config::EngineConfig;
use crate::context::ContextStore;
use crate::errors::EngineError;
use crate::executor::{QueryBackend, RetryDelay, TaskExecutor, TokioDelay};
use crate::interpreter::Interpreter;
use crate::pipeline::{OracleCorrector, PipelineStage, SqlArtifactValidator};
use crate::planner::{Assessor, Decomposer, TaskGraph};
use crate::scheduler::{QueryTaskWorker, Scheduler};
use oracle_contracts::{GenerationOracle, PromptPurpose};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const ARTIFACT_PROMPT: &str = r#"SYSTEM PROMPT:
You are an expert SQL analyst. Write a single ANSI SQL query that answers
the question below. Your ONLY output must be the bare SQL text, starting
with SELECT or WITH, without markdown fences or commentary.

AVAILABLE CONTEXT:
{context}

{feedback}

QUESTION:
{question}"#;

const CLARIFICATION_TEXT: &str =
    "Could you say a bit more about what you would like to know? A short, specific question works best.";

const OUT_OF_SCOPE_TEXT: &str =
    "That question falls outside the data I can analyse. I can help with questions about your own analytics data.";

const NO_ANSWER_TEXT: &str =
    "I could not produce an answer to your question this time. Please try rephrasing it.";

/// A user question scoped to one tenant's data and conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub isolation_key: String,
}

impl Question {
    pub fn new(text: impl Into<String>, isolation_key: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            isolation_key: isolation_key.into(),
        }
    }
}

/// The engine's final product for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineAnswer {
    pub text: String,
    /// True when any part of the pipeline fell back to unvalidated or
    /// partial output.
    pub degraded: bool,
    pub warnings: Vec<String>,
    pub stage_trace: Vec<EngineStage>,
}

/// Top-level orchestrator. Owns no business state between questions; every
/// call to answer_question() runs the full plan-schedule-interpret cycle
/// against the injected seams.
pub struct AnalystEngine {
    oracle: Arc<dyn GenerationOracle>,
    backend: Arc<dyn QueryBackend>,
    context_store: Arc<dyn ContextStore>,
    sink: Arc<dyn ProgressSink>,
    delay: Arc<dyn RetryDelay>,
    config: EngineConfig,
}

impl AnalystEngine {
    pub fn new(
        oracle: Arc<dyn GenerationOracle>,
        backend: Arc<dyn QueryBackend>,
        context_store: Arc<dyn ContextStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            oracle,
            backend,
            context_store,
            sink: Arc::new(NullSink),
            delay: Arc::new(TokioDelay),
            config,
        }
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_retry_delay(mut self, delay: Arc<dyn RetryDelay>) -> Self {
        self.delay = delay;
        self
    }

    pub async fn answer_question(
        &self,
        question: &Question,
        cancel: &CancellationToken,
    ) -> Result<EngineAnswer, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let mut trace = Vec::new();

        if is_too_vague(&question.text) {
            self.emit(&mut trace, EngineStage::NeedsClarification, 1);
            return Ok(EngineAnswer {
                text: CLARIFICATION_TEXT.to_string(),
                degraded: false,
                warnings: Vec::new(),
                stage_trace: trace,
            });
        }
        if !self.in_scope(&question.text) {
            self.emit(&mut trace, EngineStage::OutOfScope, 1);
            return Ok(EngineAnswer {
                text: OUT_OF_SCOPE_TEXT.to_string(),
                degraded: false,
                warnings: Vec::new(),
                stage_trace: trace,
            });
        }

        let context = self.context_store.read_context(&question.isolation_key).await;
        let (mut graph, coverage_warning) = self.plan(question, &context, &mut trace).await;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        self.emit(&mut trace, EngineStage::Schedule, 1);
        let worker = QueryTaskWorker::new(
            self.artifact_stage(),
            TaskExecutor::new(
                self.backend.clone(),
                self.delay.clone(),
                self.config.executor_backoff.clone(),
                self.config.executor_timeout,
            ),
            question.isolation_key.clone(),
        );
        let scheduler = Scheduler::new(
            Arc::new(worker),
            self.config.max_concurrency_per_layer,
            self.config.dependency_summary_limit,
        );
        let outcomes = scheduler.run(&mut graph, &context, cancel).await;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let payload = aggregate(&outcomes, &question.text);
        let mut warnings = Vec::new();
        if let Some(warning) = &coverage_warning {
            warnings.push(warning.clone());
        }
        for entry in payload.entries.values() {
            if let Some(error) = &entry.error {
                warnings.push(format!("Could not answer '{}': {}", entry.question, error));
            }
        }
        if payload.has_degraded_entry() {
            warnings.push(
                "Some results came from queries that could not be fully validated.".to_string(),
            );
        }
        if payload.is_total_failure() {
            warn!("Every task failed, interpretation will explain rather than answer");
        }

        self.emit(&mut trace, EngineStage::Interpret, 1);
        let interpreter = Interpreter::new(
            self.oracle.clone(),
            self.config.max_interpretation_attempts,
            self.config.oracle_timeout,
        );
        let interpretation = interpreter.interpret(&payload, cancel).await;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.emit(&mut trace, EngineStage::ValidateInterpretation, interpretation.attempts_used);
        if interpretation.exhausted {
            warnings.push("The final answer could not be fully validated.".to_string());
        }

        self.emit(&mut trace, EngineStage::Format, 1);
        let text = if interpretation.final_artifact.trim().is_empty() {
            NO_ANSWER_TEXT.to_string()
        } else {
            interpretation.final_artifact.clone()
        };
        let degraded = interpretation.exhausted
            || coverage_warning.is_some()
            || payload.has_degraded_entry()
            || payload.failed_count() > 0
            || interpretation.final_artifact.trim().is_empty();

        self.emit(&mut trace, EngineStage::Done, 1);
        info!(
            degraded,
            warnings = warnings.len(),
            tasks = payload.entries.len(),
            "Question answered"
        );
        Ok(EngineAnswer {
            text,
            degraded,
            warnings,
            stage_trace: trace,
        })
    }

    /// Decompose-and-assess loop. Each incomplete verdict feeds the next
    /// decomposition round; a single-task plan never goes through assessment.
    /// When the retry maximum is reached with the plan still incomplete, the
    /// last plan is used anyway and the incomplete verdict comes back as a
    /// user-facing coverage warning.
    async fn plan(
        &self,
        question: &Question,
        context: &str,
        trace: &mut Vec<EngineStage>,
    ) -> (TaskGraph, Option<String>) {
        let decomposer = Decomposer::new(self.oracle.clone(), self.config.oracle_timeout);
        let assessor = Assessor::new(self.oracle.clone(), self.config.oracle_timeout);

        let mut feedback: Option<String> = None;
        let mut round = 0u32;
        loop {
            self.emit(trace, EngineStage::Plan, round + 1);
            let graph = decomposer
                .decompose(&question.text, context, feedback.as_deref())
                .await;
            if graph.is_single_task() {
                return (graph, None);
            }

            self.emit(trace, EngineStage::AssessDecomposition, round + 1);
            let assessment = assessor.assess(&graph).await;
            if assessment.complete {
                return (graph, None);
            }
            if round >= self.config.max_decomposition_retries {
                warn!(
                    round,
                    missing = assessment.missing_intents.len(),
                    "Plan still incomplete after final round, proceeding degraded"
                );
                return (graph, Some(coverage_warning(&assessment)));
            }
            warn!(
                round,
                missing = assessment.missing_intents.len(),
                "Plan judged incomplete, re-planning with feedback"
            );
            feedback = Some(if assessment.missing_intents.is_empty() {
                assessment.feedback.clone()
            } else {
                format!(
                    "{} Missing intents: {}.",
                    assessment.feedback,
                    assessment.missing_intents.join(", ")
                )
            });
            round += 1;
        }
    }

    fn artifact_stage(&self) -> PipelineStage {
        PipelineStage::new(
            "artifact_generation",
            PromptPurpose::ArtifactGeneration,
            ARTIFACT_PROMPT,
            self.oracle.clone(),
            Arc::new(SqlArtifactValidator::new()),
            Arc::new(OracleCorrector::new(
                self.oracle.clone(),
                self.config.oracle_timeout,
            )),
            self.config.max_artifact_attempts,
            self.config.oracle_timeout,
        )
    }

    fn in_scope(&self, text: &str) -> bool {
        if self.config.known_domains.is_empty() {
            return true;
        }
        let lowered = text.to_lowercase();
        self.config
            .known_domains
            .iter()
            .any(|domain| lowered.contains(&domain.to_lowercase()))
    }

    fn emit(&self, trace: &mut Vec<EngineStage>, stage: EngineStage, attempt: u32) {
        trace.push(stage);
        self.sink.emit(ProgressEvent::now(stage, attempt));
    }
}

fn is_too_vague(text: &str) -> bool {
    text.trim().split_whitespace().count() < 2
}

fn coverage_warning(assessment: &crate::planner::CoverageAssessment) -> String {
    if assessment.missing_intents.is_empty() {
        "The answer may not cover every part of your question.".to_string()
    } else {
        format!(
            "The answer may not cover: {}.",
            assessment.missing_intents.join(", ")
        )
    }
}
