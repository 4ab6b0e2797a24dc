//! # Dependency Graph
//!
//! Adjacency view over a workflow's task edges. Readiness is evaluated against a status
//! snapshot taken once per tick, so a successor is only started when every predecessor
//! reads SUCCESSFUL in that snapshot.

use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::Task;
use crate::state_machine::TaskStatus;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Task ids in creation order
    order: Vec<Uuid>,
    predecessors: HashMap<Uuid, Vec<Uuid>>,
    successors: HashMap<Uuid, Vec<Uuid>>,
}

impl DependencyGraph {
    /// Build from task records; edges are taken from `previous_task_ids`
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = Self {
            order: tasks.iter().map(|t| t.task_id).collect(),
            ..Self::default()
        };

        for task in tasks {
            graph.predecessors.entry(task.task_id).or_default();
            graph.successors.entry(task.task_id).or_default();
        }
        for task in tasks {
            for predecessor in &task.previous_task_ids {
                graph
                    .predecessors
                    .entry(task.task_id)
                    .or_default()
                    .push(*predecessor);
                graph
                    .successors
                    .entry(*predecessor)
                    .or_default()
                    .push(task.task_id);
            }
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn predecessors(&self, task_id: Uuid) -> &[Uuid] {
        self.predecessors
            .get(&task_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn successors(&self, task_id: Uuid) -> &[Uuid] {
        self.successors
            .get(&task_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Tasks with no predecessors, in creation order
    pub fn roots(&self) -> Vec<Uuid> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.predecessors(*id).is_empty())
            .collect()
    }

    /// Kahn's algorithm; ties keep creation order
    pub fn topological_order(&self) -> Result<Vec<Uuid>> {
        let (sorted, stuck) = self.kahn();
        match stuck {
            Some(task_id) => Err(EngineError::CycleDetected(task_id.to_string())),
            None => Ok(sorted),
        }
    }

    /// Some task on (or behind) a cycle, if the graph has one
    pub fn cycle_member(&self) -> Option<Uuid> {
        self.kahn().1
    }

    fn kahn(&self) -> (Vec<Uuid>, Option<Uuid>) {
        let mut in_degree: HashMap<Uuid, usize> = self
            .order
            .iter()
            .map(|id| (*id, self.predecessors(*id).len()))
            .collect();
        let mut queue: VecDeque<Uuid> = self.roots().into_iter().collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while let Some(task_id) = queue.pop_front() {
            sorted.push(task_id);
            for successor in self.successors(task_id) {
                if let Some(degree) = in_degree.get_mut(successor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*successor);
                    }
                }
            }
        }

        let stuck = self
            .order
            .iter()
            .find(|id| in_degree.get(id).copied().unwrap_or(0) > 0)
            .copied();
        (sorted, stuck)
    }

    /// Every predecessor SUCCESSFUL in `statuses`; unknown predecessors block
    pub fn is_ready(&self, task_id: Uuid, statuses: &HashMap<Uuid, TaskStatus>) -> bool {
        self.predecessors(task_id).iter().all(|predecessor| {
            statuses
                .get(predecessor)
                .is_some_and(TaskStatus::satisfies_dependencies)
        })
    }

    /// Predecessors not yet SUCCESSFUL
    pub fn blocked_by(&self, task_id: Uuid, statuses: &HashMap<Uuid, TaskStatus>) -> Vec<Uuid> {
        self.predecessors(task_id)
            .iter()
            .copied()
            .filter(|predecessor| {
                !statuses
                    .get(predecessor)
                    .is_some_and(TaskStatus::satisfies_dependencies)
            })
            .collect()
    }
}
