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

//! Scripted stand-ins for the oracle, backend and delay seams. Used by the
//! test suites and by demos that run without live credentials.

use crate::executor::{BackendError, QueryBackend, RetryDelay};
use crate::orchestrator::{ProgressEvent, ProgressSink};
use async_trait::async_trait;
use oracle_contracts::{
    GenerationOracle, GenerationRequest, GenerationResponse, OracleError, OracleResult,
    PromptPurpose,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Oracle double that replays canned responses. Responses queued per purpose
/// are consumed in order; when a purpose's queue runs dry the fallback (if
/// any) answers every remaining call.
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<PromptPurpose, VecDeque<String>>>,
    fallback: Option<String>,
    calls: Arc<AtomicU32>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: None,
            calls: Arc::new(AtomicU32::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_script(self, purpose: PromptPurpose, content: impl Into<String>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(purpose)
            .or_default()
            .push_back(content.into());
        self
    }

    pub fn with_fallback(mut self, content: impl Into<String>) -> Self {
        self.fallback = Some(content.into());
        self
    }

    /// Counts generate() calls across all purposes.
    pub fn call_counter(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }

    /// Rendered prompts in call order.
    pub fn recorded_prompts(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationOracle for ScriptedOracle {
    async fn generate(&self, request: GenerationRequest) -> OracleResult<GenerationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push(request.prompt_spec.render());

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.purpose)
            .and_then(|queue| queue.pop_front());
        match scripted.or_else(|| self.fallback.clone()) {
            Some(content) => Ok(GenerationResponse::text(request.id, content)),
            None => Err(OracleError::Provider(format!(
                "no scripted response for purpose {:?}",
                request.purpose
            ))),
        }
    }
}

/// Backend double with a per-call result queue and optional fallback.
pub struct ScriptedBackend {
    results: Mutex<VecDeque<Result<Value, BackendError>>>,
    fallback: Option<Result<Value, BackendError>>,
    calls: Arc<AtomicU32>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_result(self, result: Result<Value, BackendError>) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    pub fn with_fallback(mut self, result: Result<Value, BackendError>) -> Self {
        self.fallback = Some(result);
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryBackend for ScriptedBackend {
    async fn run_query(
        &self,
        _artifact: &str,
        _isolation_key: &str,
    ) -> Result<Value, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.results.lock().unwrap().pop_front();
        match queued.or_else(|| self.fallback.clone()) {
            Some(result) => result,
            None => Err(BackendError("scripted backend exhausted".to_string())),
        }
    }
}

/// Delay provider that records the requested durations without sleeping.
pub struct RecordingDelay {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self {
            waits: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

impl Default for RecordingDelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetryDelay for RecordingDelay {
    async fn wait(&self, delay: Duration) {
        self.waits.lock().unwrap().push(delay);
    }
}

/// Progress sink that collects events for later assertion.
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
