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

use crate::types::PromptPurpose;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub purpose: PromptPurpose,
    pub prompt_spec: PromptSpec,
    pub prior_attempts: Vec<PriorAttempt>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSpec {
    pub template: String,
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorAttempt {
    pub output: String,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stop_sequences: Option<Vec<String>>,
}

impl GenerationRequest {
    pub fn new(purpose: PromptPurpose, prompt_spec: PromptSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            purpose,
            prompt_spec,
            prior_attempts: Vec::new(),
            generation_config: GenerationConfig::default(),
        }
    }

    pub fn with_prior_attempts(mut self, attempts: Vec<PriorAttempt>) -> Self {
        self.prior_attempts = attempts;
        self
    }
}

impl PromptSpec {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            variables: HashMap::new(),
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn render(&self) -> String {
        let mut rendered = self.template.clone();
        for (key, value) in &self.variables {
            rendered = rendered.replace(&format!("{{{key}}}"), value);
        }
        rendered
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: Some(0.2),
            stop_sequences: None,
        }
    }
}
