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

use crate::executor::FailureCategory;
use crate::planner::graph::{TaskId, TaskStatus};
use crate::scheduler::TaskRunResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One task's contribution to the aggregate, stripped down to what the
/// interpretation stage needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedEntry {
    pub question: String,
    pub intent: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub category: Option<FailureCategory>,
    pub degraded: bool,
}

/// Deterministic collection of task outcomes keyed by task id. Building it
/// is a pure function of the outcome map, so repeated aggregation of the
/// same outcomes yields the same payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPayload {
    pub goal: String,
    pub entries: BTreeMap<TaskId, AggregatedEntry>,
}

impl AggregatedPayload {
    pub fn succeeded_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.status == TaskStatus::Succeeded)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.status == TaskStatus::Failed)
            .count()
    }

    pub fn is_total_failure(&self) -> bool {
        !self.entries.is_empty() && self.succeeded_count() == 0
    }

    pub fn has_degraded_entry(&self) -> bool {
        self.entries.values().any(|e| e.degraded)
    }

    /// Renders the payload as the context document handed to interpretation.
    /// Entries appear in task-id order so the document is stable.
    pub fn as_context_document(&self) -> String {
        let mut sections = vec![format!("Goal: {}", self.goal)];
        for (id, entry) in &self.entries {
            match entry.status {
                TaskStatus::Succeeded => sections.push(format!(
                    "[{}] {} ({})\nResult: {}",
                    id,
                    entry.question,
                    entry.intent,
                    entry.result.as_deref().unwrap_or("no rows")
                )),
                _ => sections.push(format!(
                    "[{}] {} ({})\nFailed: {}",
                    id,
                    entry.question,
                    entry.intent,
                    entry.error.as_deref().unwrap_or("no further detail")
                )),
            }
        }
        sections.join("\n\n")
    }
}

/// Collapses scheduler outcomes into the aggregate payload. Pure and
/// idempotent over its inputs.
pub fn aggregate(outcomes: &HashMap<TaskId, TaskRunResult>, goal: &str) -> AggregatedPayload {
    let entries = outcomes
        .iter()
        .map(|(id, run)| {
            (
                id.clone(),
                AggregatedEntry {
                    question: run.question.clone(),
                    intent: run.intent.clone(),
                    status: run.status,
                    result: run.result.clone(),
                    error: run.error.clone(),
                    category: run.category,
                    degraded: run.degraded,
                },
            )
        })
        .collect();
    AggregatedPayload {
        goal: goal.to_string(),
        entries,
    }
}
