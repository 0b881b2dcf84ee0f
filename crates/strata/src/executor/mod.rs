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

use crate::pipeline::validators::{balanced_delimiters, balanced_quotes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error surfaced by the external query service. Classification works purely
/// on the message text.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// The external query-execution service (Athena-like). Artifacts are opaque
/// strings; the isolation key scopes execution to one tenant.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn run_query(&self, artifact: &str, isolation_key: &str) -> Result<Value, BackendError>;
}

/// Injectable delay provider so backoff is observable in tests instead of
/// slept through.
#[async_trait]
pub trait RetryDelay: Send + Sync {
    async fn wait(&self, delay: Duration);
}

pub struct TokioDelay;

#[async_trait]
impl RetryDelay for TokioDelay {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    DataNotFound,
    Syntax,
    Timeout,
    Permission,
    Transient,
    Unknown,
}

const RETRYABLE_MARKERS: [&str; 6] = [
    "timeout",
    "timed out",
    "connection",
    "throttl",
    "rate limit",
    "temporarily unavailable",
];

impl FailureCategory {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            FailureCategory::Timeout
        } else if lower.contains("permission")
            || lower.contains("access denied")
            || lower.contains("not authorized")
            || lower.contains("forbidden")
        {
            FailureCategory::Permission
        } else if lower.contains("does not exist")
            || lower.contains("not found")
            || lower.contains("no data")
        {
            FailureCategory::DataNotFound
        } else if lower.contains("syntax") || lower.contains("parse error") || lower.contains("mismatched input") {
            FailureCategory::Syntax
        } else if RETRYABLE_MARKERS.iter().any(|m| lower.contains(m)) {
            FailureCategory::Transient
        } else {
            FailureCategory::Unknown
        }
    }

    pub fn is_retryable(message: &str) -> bool {
        let lower = message.to_lowercase();
        RETRYABLE_MARKERS.iter().any(|m| lower.contains(m))
    }

    /// Human-readable explanation, deliberately free of internal error text.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureCategory::DataNotFound => "No data is available for that request.",
            FailureCategory::Syntax => "The generated query was not accepted by the data service.",
            FailureCategory::Timeout => "The data service took too long to respond.",
            FailureCategory::Permission => "You do not have access to that data.",
            FailureCategory::Transient => "The data service is temporarily unavailable.",
            FailureCategory::Unknown => "The request could not be completed.",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCategory::DataNotFound => write!(f, "data_not_found"),
            FailureCategory::Syntax => write!(f, "syntax"),
            FailureCategory::Timeout => write!(f, "timeout"),
            FailureCategory::Permission => write!(f, "permission"),
            FailureCategory::Transient => write!(f, "transient"),
            FailureCategory::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionSuccess {
    pub data: Value,
    pub attempts_used: u32,
}

#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    pub artifact: String,
    pub category: FailureCategory,
    pub attempts_used: u32,
    pub message: String,
}

/// Executes validated artifacts against the backend with bounded retries.
/// Callers never receive a partially populated success.
pub struct TaskExecutor {
    backend: Arc<dyn QueryBackend>,
    delay: Arc<dyn RetryDelay>,
    backoff: Vec<Duration>,
    call_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(
        backend: Arc<dyn QueryBackend>,
        delay: Arc<dyn RetryDelay>,
        backoff: Vec<Duration>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            delay,
            backoff,
            call_timeout,
        }
    }

    pub async fn execute(
        &self,
        artifact: &str,
        isolation_key: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionSuccess, ExecutionFailure> {
        if let Some(issue) = well_formedness_issue(artifact) {
            debug!(issue = %issue, "Artifact rejected before dispatch");
            return Err(ExecutionFailure {
                artifact: artifact.to_string(),
                category: FailureCategory::Syntax,
                attempts_used: 0,
                message: FailureCategory::Syntax.user_message().to_string(),
            });
        }

        let max_calls = self.backoff.len() as u32 + 1;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let call = self.backend.run_query(artifact, isolation_key);
            let outcome = match tokio::time::timeout(self.call_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(BackendError("query execution timed out".to_string())),
            };

            match outcome {
                Ok(data) => {
                    info!(attempts = attempt, "Query executed successfully");
                    return Ok(ExecutionSuccess {
                        data,
                        attempts_used: attempt,
                    });
                }
                Err(e) => {
                    let retryable = FailureCategory::is_retryable(&e.0);
                    if retryable && attempt < max_calls && !cancel.is_cancelled() {
                        let delay = self.backoff[(attempt - 1) as usize];
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retryable execution failure, backing off"
                        );
                        self.delay.wait(delay).await;
                        continue;
                    }
                    let category = FailureCategory::classify(&e.0);
                    warn!(attempts = attempt, category = %category, "Query execution failed");
                    return Err(ExecutionFailure {
                        artifact: artifact.to_string(),
                        category,
                        attempts_used: attempt,
                        message: category.user_message().to_string(),
                    });
                }
            }
        }
    }
}

/// Basic well-formedness check before dispatch: balanced delimiters only,
/// the artifact is otherwise opaque.
fn well_formedness_issue(artifact: &str) -> Option<String> {
    if artifact.trim().is_empty() {
        return Some("artifact is empty".to_string());
    }
    if !balanced_delimiters(artifact, '(', ')') {
        return Some("unbalanced parentheses".to_string());
    }
    if !balanced_quotes(artifact, '\'') {
        return Some("unbalanced single quotes".to_string());
    }
    if !balanced_quotes(artifact, '"') {
        return Some("unbalanced double quotes".to_string());
    }
    None
}
