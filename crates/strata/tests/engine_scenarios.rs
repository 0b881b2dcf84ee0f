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

//! End-to-end scenarios through the full engine with scripted seams.

use oracle_contracts::PromptPurpose;
use serde_json::json;
use std::sync::Arc;
use strata::support::{RecordingDelay, RecordingSink, ScriptedBackend, ScriptedOracle};
use strata::{
    AnalystEngine, BackendError, EngineConfig, EngineStage, Question, StaticContextStore,
};
use tokio_util::sync::CancellationToken;

const TWO_TASK_PLAN: &str = r#"{"tasks": [
  {"id": "t1", "question": "What is the current engagement rate?", "intent": "measure engagement", "dependencies": []},
  {"id": "t2", "question": "How should engagement be improved?", "intent": "recommend improvements", "dependencies": ["t1"]}
]}"#;

fn engine_with(
    oracle: ScriptedOracle,
    backend: ScriptedBackend,
) -> (AnalystEngine, Arc<RecordingSink>, Arc<RecordingDelay>) {
    let sink = Arc::new(RecordingSink::new());
    let delay = Arc::new(RecordingDelay::new());
    let engine = AnalystEngine::new(
        Arc::new(oracle),
        Arc::new(backend),
        Arc::new(StaticContextStore::new()),
        EngineConfig::default(),
    )
    .with_progress_sink(sink.clone())
    .with_retry_delay(delay.clone());
    (engine, sink, delay)
}

#[tokio::test]
async fn engagement_rate_question_runs_dependent_tasks_in_order() {
    let oracle = ScriptedOracle::new()
        .with_script(PromptPurpose::Decomposition, TWO_TASK_PLAN)
        .with_script(PromptPurpose::CoverageAssessment, r#"{"complete": true}"#)
        .with_script(
            PromptPurpose::ArtifactGeneration,
            "SELECT AVG(engagement_rate) FROM daily_metrics",
        )
        .with_script(
            PromptPurpose::ArtifactGeneration,
            "SELECT suggestion FROM strategy_hints ORDER BY impact DESC",
        )
        .with_script(
            PromptPurpose::Interpretation,
            "Your engagement rate is 4.2 percent; posting short videos more often should raise it.",
        );
    let recorded = oracle.recorded_prompts();
    let backend = ScriptedBackend::new()
        .with_result(Ok(json!([{"avg_rate": 4.2}])))
        .with_result(Ok(json!([{"suggestion": "post short videos"}])));
    let (engine, sink, _) = engine_with(oracle, backend);

    let answer = engine
        .answer_question(
            &Question::new(
                "What's my engagement rate and how should I improve it?",
                "tenant-a",
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!answer.degraded);
    assert!(answer.text.contains("4.2 percent"));

    // The second task's generation prompt carries the first task's result.
    let prompts = recorded.lock().unwrap();
    let artifact_prompts: Vec<&String> = prompts
        .iter()
        .filter(|p| p.contains("expert SQL analyst"))
        .collect();
    assert_eq!(artifact_prompts.len(), 2);
    assert!(artifact_prompts[1].contains("4.2"));
    assert!(artifact_prompts[1].contains("measure engagement"));
    assert!(!artifact_prompts[0].contains("4.2"));

    let stages: Vec<EngineStage> = sink.events().iter().map(|e| e.stage).collect();
    assert!(stages.contains(&EngineStage::AssessDecomposition));
    assert_eq!(*stages.last().unwrap(), EngineStage::Done);
}

#[tokio::test]
async fn unparsable_decomposition_falls_back_to_single_task() {
    let oracle = ScriptedOracle::new()
        .with_script(PromptPurpose::Decomposition, "I cannot produce JSON, sorry")
        .with_script(PromptPurpose::Decomposition, "still not json")
        .with_script(PromptPurpose::Decomposition, "nope")
        .with_script(
            PromptPurpose::ArtifactGeneration,
            "SELECT reach FROM weekly_metrics",
        )
        .with_script(
            PromptPurpose::Interpretation,
            "Your reach last week was steady at around twelve thousand accounts.",
        );
    let backend = ScriptedBackend::new().with_result(Ok(json!([{"reach": 12000}])));
    let (engine, _, _) = engine_with(oracle, backend);

    let answer = engine
        .answer_question(
            &Question::new("What was my reach last week?", "tenant-a"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // The fallback single-task plan still produces a full answer.
    assert!(answer.text.contains("twelve thousand"));
    assert!(!answer.degraded);
}

#[tokio::test]
async fn failed_dependency_leaves_note_and_dependent_completes() {
    let oracle = ScriptedOracle::new()
        .with_script(PromptPurpose::Decomposition, TWO_TASK_PLAN)
        .with_script(PromptPurpose::CoverageAssessment, r#"{"complete": true}"#)
        .with_script(
            PromptPurpose::ArtifactGeneration,
            "SELECT AVG(engagement_rate) FROM daily_metrics",
        )
        .with_script(
            PromptPurpose::ArtifactGeneration,
            "SELECT suggestion FROM strategy_hints",
        )
        .with_script(
            PromptPurpose::Interpretation,
            "I could not measure the current rate, but general improvements are suggested below.",
        );
    let recorded = oracle.recorded_prompts();
    let backend = ScriptedBackend::new()
        .with_result(Err(BackendError(
            "Table daily_metrics does not exist".to_string(),
        )))
        .with_result(Ok(json!([{"suggestion": "post short videos"}])));
    let (engine, _, delay) = engine_with(oracle, backend);

    let answer = engine
        .answer_question(
            &Question::new(
                "What's my engagement rate and how should I improve it?",
                "tenant-a",
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // Data-not-found is not retryable, so no backoff was taken.
    assert!(delay.recorded().is_empty());
    assert!(answer.degraded);
    assert!(answer
        .warnings
        .iter()
        .any(|w| w.contains("No data is available")));
    assert!(!answer.warnings.iter().any(|w| w.contains("daily_metrics")));

    // The dependent task still ran, with an explicit failure note in context.
    let prompts = recorded.lock().unwrap();
    let second_artifact_prompt = prompts
        .iter()
        .filter(|p| p.contains("expert SQL analyst"))
        .nth(1)
        .unwrap();
    assert!(second_artifact_prompt.contains("dependency 't1'"));
    assert!(second_artifact_prompt.contains("failed"));
}

#[tokio::test]
async fn transient_errors_follow_backoff_then_succeed() {
    let oracle = ScriptedOracle::new()
        .with_script(
            PromptPurpose::Decomposition,
            r#"{"tasks": [{"id": "t1", "question": "sessions last week", "intent": "count sessions", "dependencies": []}]}"#,
        )
        .with_script(
            PromptPurpose::ArtifactGeneration,
            "SELECT COUNT(*) FROM sessions",
        )
        .with_script(
            PromptPurpose::Interpretation,
            "You had nine hundred and eighty sessions last week in total.",
        );
    let backend = ScriptedBackend::new()
        .with_result(Err(BackendError("connection reset by peer".to_string())))
        .with_result(Err(BackendError("request throttled".to_string())))
        .with_result(Err(BackendError(
            "service temporarily unavailable".to_string(),
        )))
        .with_result(Ok(json!([{"sessions": 980}])));
    let (engine, _, delay) = engine_with(oracle, backend);

    let answer = engine
        .answer_question(
            &Question::new("How many sessions did I get last week?", "tenant-a"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!answer.degraded);
    let waited: Vec<u64> = delay.recorded().iter().map(|d| d.as_secs()).collect();
    assert_eq!(waited, vec![1, 2, 4]);
}

#[tokio::test]
async fn permission_error_surfaces_without_retries() {
    let oracle = ScriptedOracle::new()
        .with_script(
            PromptPurpose::Decomposition,
            r#"{"tasks": [{"id": "t1", "question": "competitor spend", "intent": "fetch spend", "dependencies": []}]}"#,
        )
        .with_script(
            PromptPurpose::ArtifactGeneration,
            "SELECT spend FROM competitor_accounts",
        )
        .with_script(
            PromptPurpose::Interpretation,
            "That data is not accessible from your account, so no spend figures can be shown.",
        );
    let backend = ScriptedBackend::new().with_fallback(Err(BackendError(
        "Access denied: insufficient permissions for competitor_accounts".to_string(),
    )));
    let backend_calls = backend.call_counter();
    let (engine, _, delay) = engine_with(oracle, backend);

    let answer = engine
        .answer_question(
            &Question::new("How much are my competitors spending?", "tenant-a"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(backend_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(delay.recorded().is_empty());
    assert!(answer.degraded);
    assert!(answer
        .warnings
        .iter()
        .any(|w| w.contains("You do not have access")));
}
