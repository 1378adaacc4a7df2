//! Dependency graph for gating pending tasks.
//!
//! Design:
//! - Forward edges: task -> dependencies it still waits for
//! - Reverse edges: dependency -> tasks waiting for it
//! - Invariant: edges and reverse_edges must be kept in sync
//! - Only unsatisfied dependencies have edges. A task with no forward edges
//!   is eligible for dispatch, so evicting an old result from the result
//!   store never re-blocks anything.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::domain::TaskId;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward edges: task -> tasks it depends on (waits for)
    edges: HashMap<TaskId, HashSet<TaskId>>,

    /// Reverse edges: task -> tasks that depend on it (waiting tasks)
    reverse_edges: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency: `task` depends on `depends_on`.
    ///
    /// add_dependency(task_b, task_a) means "B waits for A".
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        self.edges.entry(task).or_default().insert(depends_on);
        self.reverse_edges
            .entry(depends_on)
            .or_default()
            .insert(task);
    }

    /// `completed` produced a successful result: drop every edge pointing at it.
    ///
    /// Returns the tasks that no longer wait for anything.
    pub fn resolve(&mut self, completed: TaskId) -> Vec<TaskId> {
        let Some(waiting) = self.reverse_edges.remove(&completed) else {
            return Vec::new();
        };
        let mut unblocked = Vec::new();
        for task in waiting {
            if let Entry::Occupied(mut e) = self.edges.entry(task) {
                e.get_mut().remove(&completed);
                if e.get().is_empty() {
                    e.remove_entry();
                    unblocked.push(task);
                }
            }
        }
        unblocked
    }

    /// Forget the forward edges of `task` (it left the pending list without
    /// running). Tasks waiting *for* `task` keep waiting.
    pub fn remove_task(&mut self, task: TaskId) {
        let Some(deps) = self.edges.remove(&task) else {
            return;
        };
        for dep in deps {
            if let Entry::Occupied(mut e) = self.reverse_edges.entry(dep) {
                e.get_mut().remove(&task);
                if e.get().is_empty() {
                    e.remove_entry();
                }
            }
        }
    }

    /// Get all tasks waiting for `task`.
    pub fn get_waiting_tasks(&self, task: TaskId) -> Vec<TaskId> {
        self.reverse_edges
            .get(&task)
            .map(|waiting| waiting.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Check if `task` still waits for anything.
    pub fn has_dependencies(&self, task: TaskId) -> bool {
        self.edges
            .get(&task)
            .is_some_and(|deps| !deps.is_empty())
    }

    /// Unsatisfied dependencies of `task`, sorted.
    pub fn get_dependencies(&self, task: TaskId) -> Vec<TaskId> {
        let mut deps: Vec<TaskId> = self
            .edges
            .get(&task)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default();
        deps.sort();
        deps
    }

    pub fn clear(&mut self) {
        self.edges.clear();
        self.reverse_edges.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.reverse_edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn id() -> TaskId {
        TaskId::from(Ulid::new())
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = DependencyGraph::new();
        assert!(!graph.has_dependencies(id()));
        assert!(graph.is_empty());
    }

    #[test]
    fn add_dependency_creates_both_edges() {
        let mut graph = DependencyGraph::new();
        let task_a = id();
        let task_b = id();

        graph.add_dependency(task_b, task_a); // B depends on A

        assert!(graph.has_dependencies(task_b));
        assert!(!graph.has_dependencies(task_a));
        assert_eq!(graph.get_dependencies(task_b), vec![task_a]);
        assert_eq!(graph.get_waiting_tasks(task_a), vec![task_b]);
    }

    #[test]
    fn resolve_unblocks_only_fully_satisfied() {
        let mut graph = DependencyGraph::new();
        let a = id();
        let b = id();
        let c = id();
        let d = id();

        // C depends on A and B, D depends on A only
        graph.add_dependency(c, a);
        graph.add_dependency(c, b);
        graph.add_dependency(d, a);

        let mut unblocked = graph.resolve(a);
        unblocked.sort();
        assert_eq!(unblocked, vec![d]);
        assert_eq!(graph.get_dependencies(c), vec![b]);

        assert_eq!(graph.resolve(b), vec![c]);
        assert!(graph.is_empty());
    }

    #[test]
    fn resolving_unknown_task_is_noop() {
        let mut graph = DependencyGraph::new();
        let a = id();
        let b = id();
        graph.add_dependency(b, a);

        assert!(graph.resolve(id()).is_empty());
        assert!(graph.has_dependencies(b));
    }

    #[test]
    fn remove_task_keeps_dependents_blocked() {
        let mut graph = DependencyGraph::new();
        let a = id();
        let b = id();
        let c = id();

        // B waits for A, C waits for B
        graph.add_dependency(b, a);
        graph.add_dependency(c, b);

        graph.remove_task(b);

        assert!(!graph.has_dependencies(b));
        assert!(graph.get_waiting_tasks(a).is_empty());
        assert_eq!(graph.get_dependencies(c), vec![b]);
    }
}
