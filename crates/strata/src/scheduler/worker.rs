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

use crate::executor::{FailureCategory, TaskExecutor};
use crate::pipeline::{PipelineStage, StageInput};
use crate::planner::graph::{Task, TaskStatus};
use crate::scheduler::{TaskRunResult, TaskWorker};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Production worker: generates an artifact through the validated pipeline,
/// then runs it against the query backend. An exhausted pipeline still
/// dispatches its best artifact, with the outcome marked degraded.
pub struct QueryTaskWorker {
    pipeline: PipelineStage,
    executor: TaskExecutor,
    isolation_key: String,
}

impl QueryTaskWorker {
    pub fn new(pipeline: PipelineStage, executor: TaskExecutor, isolation_key: String) -> Self {
        Self {
            pipeline,
            executor,
            isolation_key,
        }
    }
}

#[async_trait]
impl TaskWorker for QueryTaskWorker {
    async fn run_task(
        &self,
        task: &Task,
        context: &str,
        cancel: CancellationToken,
    ) -> TaskRunResult {
        let input = StageInput {
            question: task.question.clone(),
            context: context.to_string(),
        };
        let pipeline_result = self.pipeline.run(&input, &cancel).await;
        let generation_attempts = pipeline_result.attempts_used;

        if pipeline_result.final_artifact.trim().is_empty() {
            warn!(task = %task.id, "No artifact produced, task cannot be dispatched");
            return TaskRunResult {
                task_id: task.id.clone(),
                question: task.question.clone(),
                intent: task.intent.clone(),
                status: TaskStatus::Failed,
                artifact: None,
                result: None,
                error: Some(FailureCategory::Unknown.user_message().to_string()),
                category: Some(FailureCategory::Unknown),
                attempts: generation_attempts,
                degraded: pipeline_result.exhausted,
            };
        }

        debug!(
            task = %task.id,
            generation_attempts,
            exhausted = pipeline_result.exhausted,
            "Dispatching artifact to backend"
        );
        match self
            .executor
            .execute(&pipeline_result.final_artifact, &self.isolation_key, &cancel)
            .await
        {
            Ok(success) => TaskRunResult {
                task_id: task.id.clone(),
                question: task.question.clone(),
                intent: task.intent.clone(),
                status: TaskStatus::Succeeded,
                artifact: Some(pipeline_result.final_artifact),
                result: Some(success.data.to_string()),
                error: None,
                category: None,
                attempts: generation_attempts + success.attempts_used,
                degraded: pipeline_result.exhausted,
            },
            Err(failure) => {
                warn!(
                    task = %task.id,
                    category = %failure.category,
                    "Artifact execution failed"
                );
                TaskRunResult {
                    task_id: task.id.clone(),
                    question: task.question.clone(),
                    intent: task.intent.clone(),
                    status: TaskStatus::Failed,
                    artifact: Some(failure.artifact),
                    result: None,
                    error: Some(failure.category.user_message().to_string()),
                    category: Some(failure.category),
                    attempts: generation_attempts + failure.attempts_used,
                    degraded: pipeline_result.exhausted,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{BackendError, TokioDelay};
    use crate::pipeline::{OracleCorrector, SqlArtifactValidator};
    use crate::support::{ScriptedBackend, ScriptedOracle};
    use oracle_contracts::PromptPurpose;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            question: "total sessions last week".to_string(),
            intent: "count sessions".to_string(),
            dependencies: Vec::new(),
            layer: 1,
            status: TaskStatus::Pending,
            artifact: None,
            result: None,
            attempts: 0,
        }
    }

    fn worker(oracle: Arc<ScriptedOracle>, backend: Arc<ScriptedBackend>) -> QueryTaskWorker {
        let pipeline = PipelineStage::new(
            "artifact_generation",
            PromptPurpose::ArtifactGeneration,
            "Write a SQL query answering: {question}\nContext: {context}\n{feedback}",
            oracle.clone(),
            Arc::new(SqlArtifactValidator::new()),
            Arc::new(OracleCorrector::new(oracle, Duration::from_secs(5))),
            3,
            Duration::from_secs(5),
        );
        let executor = TaskExecutor::new(
            backend,
            Arc::new(TokioDelay),
            vec![Duration::from_millis(1)],
            Duration::from_secs(5),
        );
        QueryTaskWorker::new(pipeline, executor, "tenant-a".to_string())
    }

    #[tokio::test]
    async fn test_valid_artifact_executes_and_succeeds() {
        let oracle = Arc::new(ScriptedOracle::new().with_fallback(
            "SELECT COUNT(*) FROM sessions WHERE started_at > now() - interval '7' day",
        ));
        let backend =
            Arc::new(ScriptedBackend::new().with_result(Ok(json!({"rows": [[42]]}))));
        let run = worker(oracle, backend)
            .run_task(&task("t1"), "", CancellationToken::new())
            .await;
        assert_eq!(run.status, TaskStatus::Succeeded);
        assert!(run.result.as_deref().unwrap().contains("42"));
        assert!(!run.degraded);
    }

    #[tokio::test]
    async fn test_backend_failure_yields_user_facing_error() {
        let oracle =
            Arc::new(ScriptedOracle::new().with_fallback("SELECT * FROM restricted_table"));
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_fallback(Err(BackendError("access denied to restricted_table".into()))),
        );
        let run = worker(oracle, backend)
            .run_task(&task("t1"), "", CancellationToken::new())
            .await;
        assert_eq!(run.status, TaskStatus::Failed);
        assert_eq!(run.category, Some(FailureCategory::Permission));
        assert!(!run.error.as_deref().unwrap().contains("restricted_table"));
    }

    #[tokio::test]
    async fn test_attempts_count_covers_generation_and_execution() {
        let oracle = Arc::new(
            ScriptedOracle::new().with_fallback("SELECT COUNT(*) FROM sessions"),
        );
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_result(Err(BackendError("connection reset by peer".into())))
                .with_result(Ok(json!({"rows": [[42]]}))),
        );
        let run = worker(oracle, backend)
            .run_task(&task("t1"), "", CancellationToken::new())
            .await;
        assert_eq!(run.status, TaskStatus::Succeeded);
        // One generation pass plus two backend dispatches.
        assert_eq!(run.attempts, 3);
    }

    #[tokio::test]
    async fn test_empty_artifact_is_not_dispatched() {
        let oracle = Arc::new(ScriptedOracle::new().with_fallback(""));
        let backend = Arc::new(ScriptedBackend::new().with_fallback(Ok(json!({"rows": []}))));
        let backend_calls = backend.call_counter();
        let run = worker(oracle, backend)
            .run_task(&task("t1"), "", CancellationToken::new())
            .await;
        assert_eq!(run.status, TaskStatus::Failed);
        assert_eq!(
            backend_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }
}
