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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine lifecycle stages, emitted in order as a question is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStage {
    Plan,
    AssessDecomposition,
    Schedule,
    Interpret,
    ValidateInterpretation,
    Format,
    Done,
    OutOfScope,
    NeedsClarification,
}

impl fmt::Display for EngineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineStage::Plan => "plan",
            EngineStage::AssessDecomposition => "assess_decomposition",
            EngineStage::Schedule => "schedule",
            EngineStage::Interpret => "interpret",
            EngineStage::ValidateInterpretation => "validate_interpretation",
            EngineStage::Format => "format",
            EngineStage::Done => "done",
            EngineStage::OutOfScope => "out_of_scope",
            EngineStage::NeedsClarification => "needs_clarification",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: EngineStage,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn now(stage: EngineStage, attempt: u32) -> Self {
        Self {
            stage,
            attempt,
            timestamp: Utc::now(),
        }
    }
}

/// Receives progress events as the engine advances. Implementations must
/// return promptly; the engine calls emit() inline on its own task.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}
