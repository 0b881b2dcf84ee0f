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

use async_trait::async_trait;
use std::collections::HashMap;

/// Read-only view over the external conversation store. The engine reads a
/// bounded context summary at the start of a question and never writes back.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn read_context(&self, isolation_key: &str) -> String;
}

#[derive(Debug, Default)]
pub struct StaticContextStore {
    summaries: HashMap<String, String>,
}

impl StaticContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(mut self, isolation_key: impl Into<String>, summary: impl Into<String>) -> Self {
        self.summaries.insert(isolation_key.into(), summary.into());
        self
    }
}

#[async_trait]
impl ContextStore for StaticContextStore {
    async fn read_context(&self, isolation_key: &str) -> String {
        self.summaries.get(isolation_key).cloned().unwrap_or_default()
    }
}

const TRUNCATION_MARKER: &str = "…[truncated]";

/// Truncates a summary on a character boundary, marking the cut. The marker
/// counts against the limit, so output never exceeds `limit` characters.
pub fn truncate_summary(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
