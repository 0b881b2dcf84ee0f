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

pub mod assessor;
pub mod decomposer;
pub mod graph;

pub use assessor::{Assessor, CoverageAssessment};
pub use decomposer::Decomposer;
pub use graph::{Task, TaskGraph, TaskId, TaskSpec, TaskStatus};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref MARKDOWN_JSON_REGEX: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap();
    static ref BRACE_JSON_REGEX: Regex = Regex::new(r"(?s)(\{.*\})").unwrap();
}

/// Pulls the first JSON object out of raw oracle output, tolerating markdown
/// fences and surrounding prose.
pub(crate) fn extract_json_from_oracle_output(text: &str) -> Option<String> {
    if let Some(captures) = MARKDOWN_JSON_REGEX.captures(text) {
        if let Some(json_match) = captures.get(1) {
            return Some(json_match.as_str().to_string());
        }
    }
    if let Some(captures) = BRACE_JSON_REGEX.captures(text) {
        if let Some(json_match) = captures.get(1) {
            return Some(json_match.as_str().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_fenced_json() {
        let raw = "Here is the plan:\n```json\n{\"tasks\": []}\n```\nDone.";
        assert_eq!(
            extract_json_from_oracle_output(raw).unwrap(),
            "{\"tasks\": []}"
        );
    }

    #[test]
    fn test_extracts_bare_json() {
        let raw = "plan follows {\"complete\": true} trailing";
        assert_eq!(
            extract_json_from_oracle_output(raw).unwrap(),
            "{\"complete\": true}"
        );
    }

    #[test]
    fn test_no_json_yields_none() {
        assert!(extract_json_from_oracle_output("no structure here").is_none());
    }
}
