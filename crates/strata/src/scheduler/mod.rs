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

pub mod worker;

pub use worker::QueryTaskWorker;

use crate::context::truncate_summary;
use crate::executor::FailureCategory;
use crate::planner::graph::{Task, TaskGraph, TaskId, TaskStatus};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Terminal record for one task, self-contained so downstream aggregation
/// needs nothing but the result map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunResult {
    pub task_id: TaskId,
    pub question: String,
    pub intent: String,
    pub status: TaskStatus,
    pub artifact: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub category: Option<FailureCategory>,
    pub attempts: u32,
    pub degraded: bool,
}

/// Runs one task to a terminal state given its assembled context. Workers
/// may only write to the task they were handed, never to siblings.
#[async_trait]
pub trait TaskWorker: Send + Sync {
    async fn run_task(
        &self,
        task: &Task,
        context: &str,
        cancel: CancellationToken,
    ) -> TaskRunResult;
}

/// Dependency-layered parallel scheduler. Layer k completes fully before
/// layer k+1 starts; within a layer execution order is unordered and bounded
/// by an optional concurrency cap.
pub struct Scheduler {
    worker: Arc<dyn TaskWorker>,
    max_concurrency_per_layer: Option<usize>,
    dependency_summary_limit: usize,
}

impl Scheduler {
    pub fn new(
        worker: Arc<dyn TaskWorker>,
        max_concurrency_per_layer: Option<usize>,
        dependency_summary_limit: usize,
    ) -> Self {
        Self {
            worker,
            max_concurrency_per_layer,
            dependency_summary_limit,
        }
    }

    pub async fn run(
        &self,
        graph: &mut TaskGraph,
        base_context: &str,
        cancel: &CancellationToken,
    ) -> HashMap<TaskId, TaskRunResult> {
        let layer_ids: Vec<(u32, Vec<TaskId>)> = graph
            .layers()
            .into_iter()
            .map(|(layer, tasks)| (layer, tasks.iter().map(|t| t.id.clone()).collect()))
            .collect();

        // One bounded pool for the whole run; None means full fan-out
        // within each layer.
        let pool: Option<Arc<Semaphore>> = self
            .max_concurrency_per_layer
            .map(|cap| Arc::new(Semaphore::new(cap.max(1))));

        let mut completed: HashMap<TaskId, TaskRunResult> = HashMap::new();
        for (layer, ids) in layer_ids {
            if cancel.is_cancelled() {
                warn!(layer, "Cancellation observed, no further layers scheduled");
                break;
            }
            info!(layer, tasks = ids.len(), "Starting scheduler layer");

            let mut layer_futures = Vec::with_capacity(ids.len());
            for id in &ids {
                let task = graph
                    .get(id)
                    .cloned()
                    .expect("layer ids originate from the graph");
                graph.set_state(id, TaskStatus::Running, None, None, task.attempts);
                let context = self.assemble_context(&task, base_context, &completed);
                debug!(task = %task.id, layer, "Assembled task context");
                let worker = self.worker.clone();
                let pool = pool.clone();
                let cancel = cancel.clone();
                layer_futures.push(async move {
                    let _permit = match &pool {
                        Some(semaphore) => Some(
                            semaphore
                                .acquire()
                                .await
                                .expect("scheduler semaphore is never closed"),
                        ),
                        None => None,
                    };
                    worker.run_task(&task, &context, cancel).await
                });
            }

            // Full barrier: every task in the layer reaches a terminal state
            // before the next layer is considered.
            let results = join_all(layer_futures).await;
            for run in results {
                graph.set_state(
                    &run.task_id,
                    run.status,
                    run.artifact.clone(),
                    run.result.clone(),
                    run.attempts,
                );
                completed.insert(run.task_id.clone(), run);
            }
        }
        completed
    }

    fn assemble_context(
        &self,
        task: &Task,
        base_context: &str,
        completed: &HashMap<TaskId, TaskRunResult>,
    ) -> String {
        let mut sections = Vec::new();
        if !base_context.is_empty() {
            sections.push(base_context.to_string());
        }
        for dep in &task.dependencies {
            match completed.get(dep) {
                Some(run) if run.status == TaskStatus::Succeeded => {
                    let summary = run.result.as_deref().unwrap_or("");
                    sections.push(format!(
                        "Result of dependency '{}' ({}): {}",
                        run.task_id,
                        run.intent,
                        truncate_summary(summary, self.dependency_summary_limit)
                    ));
                }
                Some(run) => {
                    sections.push(format!(
                        "Note: dependency '{}' ({}) failed: {} Proceed with the information available.",
                        run.task_id,
                        run.intent,
                        run.error.as_deref().unwrap_or("no further detail")
                    ));
                }
                None => {
                    sections.push(format!(
                        "Note: dependency '{dep}' was not executed. Proceed with the information available."
                    ));
                }
            }
        }
        sections.join("\n")
    }
}
