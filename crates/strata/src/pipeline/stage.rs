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

use crate::pipeline::{
    Attempt, ArtifactValidator, Corrector, PipelineResult, ValidationOutcome,
};
use chrono::Utc;
use oracle_contracts::{
    GenerationOracle, GenerationRequest, PriorAttempt, PromptPurpose, PromptSpec,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Input to one pipeline stage run. `context` carries conversation context
/// plus, for dependent tasks, summaries of completed dependencies.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub question: String,
    pub context: String,
}

/// The reusable generate -> validate -> correct bounded retry loop. The same
/// machinery produces per-task artifacts and the final interpretation; only
/// the injected policies, prompt template and attempt budget differ.
pub struct PipelineStage {
    stage_name: String,
    purpose: PromptPurpose,
    template: String,
    oracle: Arc<dyn GenerationOracle>,
    validator: Arc<dyn ArtifactValidator>,
    corrector: Arc<dyn Corrector>,
    max_attempts: u32,
    oracle_timeout: Duration,
}

impl PipelineStage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stage_name: impl Into<String>,
        purpose: PromptPurpose,
        template: impl Into<String>,
        oracle: Arc<dyn GenerationOracle>,
        validator: Arc<dyn ArtifactValidator>,
        corrector: Arc<dyn Corrector>,
        max_attempts: u32,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            purpose,
            template: template.into(),
            oracle,
            validator,
            corrector,
            max_attempts: max_attempts.max(1),
            oracle_timeout,
        }
    }

    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Runs the bounded loop. Performs at most `max_attempts` generation
    /// calls; on exhaustion the most recent artifact is returned with
    /// `exhausted = true`. Cancellation is checked between attempts.
    pub async fn run(&self, input: &StageInput, cancel: &CancellationToken) -> PipelineResult {
        let mut history: Vec<Attempt> = Vec::new();
        let mut last_output = String::new();
        let mut last_validation =
            ValidationOutcome::from_issues(0.0, vec!["No attempt was made".to_string()], String::new());

        for attempt_no in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                warn!(stage = %self.stage_name, "Stage cancelled between attempts");
                break;
            }

            let output = self.generate(input, &history).await;
            let validation = self.validator.validate(&output, input);
            debug!(
                stage = %self.stage_name,
                attempt = attempt_no,
                valid = validation.valid,
                score = validation.score,
                "Validated generated artifact"
            );

            if validation.valid {
                history.push(Attempt {
                    stage_name: self.stage_name.clone(),
                    input: input.question.clone(),
                    output: output.clone(),
                    validation: validation.clone(),
                    correction: None,
                    timestamp: Utc::now(),
                });
                info!(
                    stage = %self.stage_name,
                    attempts = attempt_no,
                    "Stage produced a valid artifact"
                );
                return PipelineResult {
                    succeeded: true,
                    final_artifact: output,
                    final_validation: validation,
                    attempts_used: attempt_no,
                    exhausted: false,
                    history,
                };
            }

            let correction = if attempt_no < self.max_attempts {
                Some(self.corrector.analyse_failure(&output, &validation).await)
            } else {
                None
            };
            history.push(Attempt {
                stage_name: self.stage_name.clone(),
                input: input.question.clone(),
                output: output.clone(),
                validation: validation.clone(),
                correction,
                timestamp: Utc::now(),
            });
            last_output = output;
            last_validation = validation;
        }

        warn!(
            stage = %self.stage_name,
            attempts = history.len(),
            "Stage exhausted its attempt budget, returning degraded artifact"
        );
        PipelineResult {
            succeeded: false,
            final_artifact: last_output,
            final_validation: last_validation,
            attempts_used: history.len() as u32,
            exhausted: true,
            history,
        }
    }

    async fn generate(&self, input: &StageInput, history: &[Attempt]) -> String {
        let feedback = history
            .last()
            .and_then(|attempt| attempt.correction.as_ref())
            .map(|plan| format!("FEEDBACK ON YOUR PREVIOUS ATTEMPT:\n{}", plan.as_feedback()))
            .unwrap_or_default();
        let prompt_spec = PromptSpec::new(self.template.clone())
            .with_variable("question", &input.question)
            .with_variable("context", &input.context)
            .with_variable("feedback", feedback);
        let prior_attempts = history
            .iter()
            .map(|attempt| PriorAttempt {
                output: attempt.output.clone(),
                feedback: attempt.validation.feedback.clone(),
            })
            .collect();
        let request = GenerationRequest::new(self.purpose.clone(), prompt_spec)
            .with_prior_attempts(prior_attempts);

        match tokio::time::timeout(self.oracle_timeout, self.oracle.generate(request)).await {
            Ok(Ok(response)) => response.content,
            Ok(Err(e)) => {
                warn!(stage = %self.stage_name, error = %e, "Oracle call failed");
                String::new()
            }
            Err(_) => {
                warn!(stage = %self.stage_name, "Oracle call timed out");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::validators::SqlArtifactValidator;
    use crate::pipeline::{CorrectionPlan, Corrector};
    use crate::support::ScriptedOracle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingCorrector {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Corrector for CountingCorrector {
        async fn analyse_failure(
            &self,
            _artifact: &str,
            outcome: &ValidationOutcome,
        ) -> CorrectionPlan {
            self.calls.fetch_add(1, Ordering::SeqCst);
            CorrectionPlan {
                error_category: "syntax".to_string(),
                fix_steps: outcome.blocking_issues.clone(),
                guidance: "balance delimiters".to_string(),
            }
        }
    }

    fn stage(oracle: ScriptedOracle, max_attempts: u32) -> (PipelineStage, Arc<CountingCorrector>) {
        let corrector = Arc::new(CountingCorrector {
            calls: AtomicU32::new(0),
        });
        let stage = PipelineStage::new(
            "artifact_generation",
            PromptPurpose::ArtifactGeneration,
            "Write a query answering: {question}\nContext: {context}\n{feedback}",
            Arc::new(oracle),
            Arc::new(SqlArtifactValidator::new()),
            corrector.clone(),
            max_attempts,
            Duration::from_secs(5),
        );
        (stage, corrector)
    }

    fn input() -> StageInput {
        StageInput {
            question: "What is the engagement rate?".to_string(),
            context: String::new(),
        }
    }

    #[tokio::test]
    async fn test_valid_first_attempt_short_circuits() {
        let oracle = ScriptedOracle::new().with_script(
            PromptPurpose::ArtifactGeneration,
            "SELECT engagement_rate FROM metrics",
        );
        let (stage, corrector) = stage(oracle, 3);
        let result = stage.run(&input(), &CancellationToken::new()).await;
        assert!(result.succeeded);
        assert!(!result.exhausted);
        assert_eq!(result.attempts_used, 1);
        assert_eq!(corrector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_then_valid_uses_two_attempts() {
        let oracle = ScriptedOracle::new()
            .with_script(PromptPurpose::ArtifactGeneration, "SELECT (broken")
            .with_script(
                PromptPurpose::ArtifactGeneration,
                "SELECT engagement_rate FROM metrics",
            );
        let (stage, corrector) = stage(oracle, 3);
        let result = stage.run(&input(), &CancellationToken::new()).await;
        assert!(result.succeeded);
        assert_eq!(result.attempts_used, 2);
        assert_eq!(corrector.calls.load(Ordering::SeqCst), 1);
        assert!(result.history[1].input.contains("engagement rate"));
    }

    #[tokio::test]
    async fn test_retry_bound_never_exceeded() {
        let oracle = ScriptedOracle::new().with_fallback("SELECT (always broken");
        let counted = oracle.call_counter();
        let (stage, _) = stage(oracle, 3);
        let result = stage.run(&input(), &CancellationToken::new()).await;
        assert!(!result.succeeded);
        assert!(result.exhausted);
        assert_eq!(result.attempts_used, 3);
        assert_eq!(counted.load(Ordering::SeqCst), 3);
        assert_eq!(result.final_artifact, "SELECT (always broken");
    }

    #[tokio::test]
    async fn test_last_attempt_skips_correction() {
        let oracle = ScriptedOracle::new().with_fallback("SELECT (always broken");
        let (stage, corrector) = stage(oracle, 2);
        let result = stage.run(&input(), &CancellationToken::new()).await;
        assert!(result.exhausted);
        // One correction after attempt 1; none after the final attempt.
        assert_eq!(corrector.calls.load(Ordering::SeqCst), 1);
        assert!(result.history.last().unwrap().correction.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_first_attempt() {
        let oracle = ScriptedOracle::new().with_fallback("SELECT 1");
        let counted = oracle.call_counter();
        let (stage, _) = stage(oracle, 3);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = stage.run(&input(), &cancel).await;
        assert!(!result.succeeded);
        assert_eq!(counted.load(Ordering::SeqCst), 0);
    }
}
