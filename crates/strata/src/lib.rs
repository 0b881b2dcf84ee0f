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

//! Orchestration engine for analytical question answering: decomposes a
//! question into a dependency-layered task graph, drives each task through a
//! bounded generate-validate-correct loop, executes validated artifacts
//! against an injected query backend, and interprets the aggregated results
//! into a single answer.

pub mod aggregator;
pub mod config;
pub mod context;
pub mod errors;
pub mod executor;
pub mod interpreter;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod scheduler;
pub mod support;

pub use aggregator::{aggregate, AggregatedEntry, AggregatedPayload};
pub use config::EngineConfig;
pub use context::{ContextStore, StaticContextStore};
pub use errors::{DecompositionError, EngineError, GraphError};
pub use executor::{
    BackendError, ExecutionFailure, ExecutionSuccess, FailureCategory, QueryBackend, RetryDelay,
    TaskExecutor, TokioDelay,
};
pub use interpreter::Interpreter;
pub use orchestrator::{
    AnalystEngine, EngineAnswer, EngineStage, ProgressEvent, ProgressSink, Question,
};
pub use pipeline::{
    Attempt, ArtifactValidator, CorrectionPlan, Corrector, PipelineResult, PipelineStage,
    StageInput, ValidationOutcome,
};
pub use planner::{
    Assessor, CoverageAssessment, Decomposer, Task, TaskGraph, TaskId, TaskSpec, TaskStatus,
};
pub use scheduler::{QueryTaskWorker, Scheduler, TaskRunResult, TaskWorker};
