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

use crate::errors::GraphError;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A unit of work emitted by the decomposer before layer assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub question: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub question: String,
    pub intent: String,
    pub dependencies: Vec<TaskId>,
    pub layer: u32,
    pub status: TaskStatus,
    pub artifact: Option<String>,
    pub result: Option<String>,
    pub attempts: u32,
}

/// The full set of tasks for one question. Acyclic by construction:
/// dependencies may only reference tasks emitted earlier in the plan, so a
/// forward reference is rejected at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    pub goal: String,
    tasks: Vec<Task>,
}

impl TaskGraph {
    pub fn build(goal: impl Into<String>, specs: Vec<TaskSpec>) -> Result<Self, GraphError> {
        if specs.is_empty() {
            return Err(GraphError::Empty);
        }
        let mut layers: HashMap<TaskId, u32> = HashMap::new();
        let mut tasks = Vec::with_capacity(specs.len());
        for spec in specs {
            if layers.contains_key(&spec.id) {
                return Err(GraphError::DuplicateTask(spec.id));
            }
            let mut layer = 1u32;
            for dep in &spec.dependencies {
                match layers.get(dep) {
                    Some(dep_layer) => layer = layer.max(dep_layer + 1),
                    None => {
                        return Err(GraphError::UnknownDependency {
                            task: spec.id,
                            dependency: dep.clone(),
                        })
                    }
                }
            }
            layers.insert(spec.id.clone(), layer);
            tasks.push(Task {
                id: spec.id,
                question: spec.question,
                intent: spec.intent,
                dependencies: spec.dependencies,
                layer,
                status: TaskStatus::Pending,
                artifact: None,
                result: None,
                attempts: 0,
            });
        }
        Ok(Self {
            goal: goal.into(),
            tasks,
        })
    }

    /// Fallback graph holding the original question verbatim. Used whenever
    /// the decomposer cannot produce a usable plan.
    pub fn single(goal: impl Into<String>, question: impl Into<String>) -> Self {
        let goal = goal.into();
        Self {
            goal,
            tasks: vec![Task {
                id: "task_1".to_string(),
                question: question.into(),
                intent: "answer the question directly".to_string(),
                dependencies: Vec::new(),
                layer: 1,
                status: TaskStatus::Pending,
                artifact: None,
                result: None,
                attempts: 0,
            }],
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_single_task(&self) -> bool {
        self.tasks.len() == 1
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks grouped by layer, ascending. The unit of parallel execution.
    pub fn layers(&self) -> BTreeMap<u32, Vec<&Task>> {
        let mut grouped: BTreeMap<u32, Vec<&Task>> = BTreeMap::new();
        for task in &self.tasks {
            grouped.entry(task.layer).or_default().push(task);
        }
        grouped
    }

    /// Property check over the constructed graph: a topological order must
    /// exist. Construction already forbids forward references, so this can
    /// only fail if task state was corrupted after the fact.
    pub fn is_acyclic(&self) -> bool {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices = HashMap::new();
        for task in &self.tasks {
            indices.insert(task.id.as_str(), graph.add_node(task.id.as_str()));
        }
        for task in &self.tasks {
            for dep in &task.dependencies {
                if let (Some(&from), Some(&to)) =
                    (indices.get(dep.as_str()), indices.get(task.id.as_str()))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }
        toposort(&graph, None).is_ok()
    }

    pub(crate) fn set_state(
        &mut self,
        id: &str,
        status: TaskStatus,
        artifact: Option<String>,
        result: Option<String>,
        attempts: u32,
    ) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
            task.artifact = artifact;
            task.result = result;
            task.attempts = attempts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec {
            id: id.to_string(),
            question: format!("question for {id}"),
            intent: format!("intent for {id}"),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_layer_is_one_plus_max_dependency_layer() {
        let graph = TaskGraph::build(
            "goal",
            vec![
                spec("a", &[]),
                spec("b", &[]),
                spec("c", &["a", "b"]),
                spec("d", &["c", "a"]),
            ],
        )
        .unwrap();
        assert_eq!(graph.get("a").unwrap().layer, 1);
        assert_eq!(graph.get("b").unwrap().layer, 1);
        assert_eq!(graph.get("c").unwrap().layer, 2);
        assert_eq!(graph.get("d").unwrap().layer, 3);
        for task in graph.tasks() {
            let expected = task
                .dependencies
                .iter()
                .map(|d| graph.get(d).unwrap().layer)
                .max()
                .map_or(1, |m| m + 1);
            assert_eq!(task.layer, expected);
        }
    }

    #[test]
    fn test_forward_reference_rejected() {
        let result = TaskGraph::build("goal", vec![spec("a", &["b"]), spec("b", &[])]);
        assert!(matches!(
            result,
            Err(GraphError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = TaskGraph::build("goal", vec![spec("a", &[]), spec("a", &[])]);
        assert!(matches!(result, Err(GraphError::DuplicateTask(_))));
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(matches!(
            TaskGraph::build("goal", vec![]),
            Err(GraphError::Empty)
        ));
    }

    #[test]
    fn test_constructed_graph_is_acyclic() {
        let graph = TaskGraph::build(
            "goal",
            vec![spec("a", &[]), spec("b", &["a"]), spec("c", &["b"])],
        )
        .unwrap();
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_layers_group_in_ascending_order() {
        let graph = TaskGraph::build(
            "goal",
            vec![spec("a", &[]), spec("b", &["a"]), spec("c", &["a"])],
        )
        .unwrap();
        let layers = graph.layers();
        let keys: Vec<u32> = layers.keys().copied().collect();
        assert_eq!(keys, vec![1, 2]);
        assert_eq!(layers[&2].len(), 2);
    }

    #[test]
    fn test_single_task_fallback_shape() {
        let graph = TaskGraph::single("goal", "What's my engagement rate?");
        assert!(graph.is_single_task());
        let task = &graph.tasks()[0];
        assert_eq!(task.question, "What's my engagement rate?");
        assert_eq!(task.layer, 1);
        assert_eq!(task.status, TaskStatus::Pending);
    }
}
