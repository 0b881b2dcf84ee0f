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

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPurpose {
    Decomposition,
    CoverageAssessment,
    ArtifactGeneration,
    FailureAnalysis,
    Interpretation,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    OpenAI,
    Ollama,
    Scripted,
    Custom(String),
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type OracleResult<T> = Result<T, OracleError>;

impl From<String> for PromptPurpose {
    fn from(s: String) -> Self {
        match s.as_str() {
            "decomposition" => PromptPurpose::Decomposition,
            "coverage_assessment" => PromptPurpose::CoverageAssessment,
            "artifact_generation" => PromptPurpose::ArtifactGeneration,
            "failure_analysis" => PromptPurpose::FailureAnalysis,
            "interpretation" => PromptPurpose::Interpretation,
            _ => PromptPurpose::Custom(s),
        }
    }
}

impl From<String> for Provider {
    fn from(s: String) -> Self {
        match s.as_str() {
            "anthropic" => Provider::Anthropic,
            "openai" => Provider::OpenAI,
            "ollama" => Provider::Ollama,
            "scripted" => Provider::Scripted,
            _ => Provider::Custom(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_from_string() {
        assert_eq!(
            PromptPurpose::from("decomposition".to_string()),
            PromptPurpose::Decomposition
        );
        assert_eq!(
            PromptPurpose::from("bespoke".to_string()),
            PromptPurpose::Custom("bespoke".to_string())
        );
    }

    #[test]
    fn test_provider_from_string() {
        assert_eq!(Provider::from("scripted".to_string()), Provider::Scripted);
        assert_eq!(
            Provider::from("in-house".to_string()),
            Provider::Custom("in-house".to_string())
        );
    }
}
