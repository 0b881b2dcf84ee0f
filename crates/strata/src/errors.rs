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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecompositionError {
    #[error("Oracle call failed during decomposition: {0}")]
    Oracle(String),

    #[error("Could not find a valid JSON object in the oracle response.")]
    JsonNotFoundInResponse,

    #[error("Failed to parse oracle response into a task plan: {0}")]
    ResponseParse(#[from] serde_json::Error),

    #[error("Task plan malformed: {0}")]
    MalformedPlan(String),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Task '{task}' references dependency '{dependency}' which was not emitted before it")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task plan contains no tasks")]
    Empty,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Question processing was cancelled")]
    Cancelled,

    #[error("Graph construction failed: {0}")]
    Graph(#[from] GraphError),

    #[error("Internal engine error: {0}")]
    Internal(String),
}
