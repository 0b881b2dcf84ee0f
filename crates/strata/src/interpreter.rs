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

use crate::aggregator::AggregatedPayload;
use crate::pipeline::{
    InterpretationValidator, OracleCorrector, PipelineResult, PipelineStage, StageInput,
};
use oracle_contracts::{GenerationOracle, PromptPurpose};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INTERPRETATION_PROMPT: &str = r#"You are a data analyst reporting back to a non-technical user.

The user asked: {question}

The following task results were gathered:
{context}

Write a plain-language answer to the user's question based only on the
results above. Mention when a part of the question could not be answered
and why, in user-friendly terms. Do not include query text, internal
identifiers or error traces.
{feedback}"#;

/// Final stage: turns the aggregate payload into prose for the user,
/// revalidated and corrected through the same bounded retry machinery as
/// artifact generation.
pub struct Interpreter {
    stage: PipelineStage,
}

impl Interpreter {
    pub fn new(
        oracle: Arc<dyn GenerationOracle>,
        max_attempts: u32,
        oracle_timeout: Duration,
    ) -> Self {
        let stage = PipelineStage::new(
            "interpretation",
            PromptPurpose::Interpretation,
            INTERPRETATION_PROMPT,
            oracle.clone(),
            Arc::new(InterpretationValidator::new()),
            Arc::new(OracleCorrector::new(oracle, oracle_timeout)),
            max_attempts,
            oracle_timeout,
        );
        Self { stage }
    }

    pub async fn interpret(
        &self,
        payload: &AggregatedPayload,
        cancel: &CancellationToken,
    ) -> PipelineResult {
        let input = StageInput {
            question: payload.goal.clone(),
            context: payload.as_context_document(),
        };
        self.stage.run(&input, cancel).await
    }
}
