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
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_decomposition_retries: u32,

    pub max_artifact_attempts: u32,

    pub max_interpretation_attempts: u32,

    /// None means full fan-out within a layer.
    pub max_concurrency_per_layer: Option<usize>,

    pub executor_backoff: Vec<Duration>,

    pub oracle_timeout: Duration,

    pub executor_timeout: Duration,

    /// Upper bound on each dependency summary injected into a dependent
    /// task's context, in characters.
    pub dependency_summary_limit: usize,

    /// Domains the engine is willing to answer questions about. Empty means
    /// no scope gating.
    pub known_domains: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_decomposition_retries: 2,
            max_artifact_attempts: 3,
            max_interpretation_attempts: 2,
            max_concurrency_per_layer: None,
            executor_backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            oracle_timeout: Duration::from_secs(60),
            executor_timeout: Duration::from_secs(120),
            dependency_summary_limit: 500,
            known_domains: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_budgets() {
        let config = EngineConfig::default();
        assert_eq!(config.max_decomposition_retries, 2);
        assert_eq!(config.max_artifact_attempts, 3);
        assert_eq!(config.max_interpretation_attempts, 2);
        assert!(config.max_concurrency_per_layer.is_none());
    }

    #[test]
    fn test_default_backoff_schedule() {
        let config = EngineConfig::default();
        let secs: Vec<u64> = config.executor_backoff.iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4]);
    }
}
