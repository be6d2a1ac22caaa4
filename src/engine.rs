//! Dependency engine: cycle rejection and derived task status.
//!
//! The engine keeps no state besides a handle to the shared [`GraphStore`].
//! Task statuses are supplied by the caller through [`StatusLookup`].

use crate::graph::{self, GraphStore, SharedGraph};
use crate::types::{DependencyError, Status, StatusChange, Task, TaskId};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Source of current task statuses. `None` means the task is unknown.
pub trait StatusLookup {
    fn status(&self, task: TaskId) -> Option<Status>;
}

impl StatusLookup for HashMap<TaskId, Status> {
    fn status(&self, task: TaskId) -> Option<Status> {
        self.get(&task).copied()
    }
}

impl StatusLookup for BTreeMap<TaskId, Task> {
    fn status(&self, task: TaskId) -> Option<Status> {
        self.get(&task).map(|t| t.status)
    }
}

/// Status rule over the statuses of a task's direct dependencies.
///
/// `None` when there are no dependencies: the caller keeps the current status.
/// Blocked dominates Pending/InProgress, which dominate all-Completed.
/// Completed is never produced.
pub fn derive_from_statuses(statuses: impl IntoIterator<Item = Status>) -> Option<Status> {
    let mut any = false;
    let mut unfinished = false;

    for status in statuses {
        any = true;
        match status {
            Status::Blocked => return Some(Status::Blocked),
            Status::Pending | Status::InProgress => unfinished = true,
            Status::Completed => {}
        }
    }

    match (any, unfinished) {
        (false, _) => None,
        (true, true) => Some(Status::Pending),
        (true, false) => Some(Status::InProgress),
    }
}

/// One DFS frame: a node and the cursor into its sorted adjacency.
struct Frame {
    node: TaskId,
    neighbors: Vec<TaskId>,
    next: usize,
}

impl Frame {
    fn new(graph: &GraphStore, node: TaskId) -> Self {
        Self {
            node,
            neighbors: graph.neighbors_ref(node).collect(),
            next: 0,
        }
    }

    fn advance(&mut self) -> Option<TaskId> {
        let neighbor = self.neighbors.get(self.next).copied();
        self.next += 1;
        neighbor
    }
}

/// Search for a cycle reachable from `start`.
///
/// Explicit-stack DFS over out-edges in ascending id order. Returns the closed
/// loop (first and last element equal) for the first back-edge found.
pub fn find_cycle(graph: &GraphStore, start: TaskId) -> Option<Vec<TaskId>> {
    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut on_stack: HashSet<TaskId> = HashSet::new();
    let mut path: Vec<TaskId> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();

    visited.insert(start);
    on_stack.insert(start);
    path.push(start);
    frames.push(Frame::new(graph, start));

    while let Some(frame) = frames.last_mut() {
        match frame.advance() {
            Some(next) if on_stack.contains(&next) => {
                // `next` is on the path; everything before it is a lead-in, not the loop
                let first = path.iter().position(|&n| n == next).unwrap_or(0);
                let mut cycle = path.split_off(first);
                cycle.push(next);
                return Some(cycle);
            }
            Some(next) if visited.contains(&next) => {}
            Some(next) => {
                visited.insert(next);
                on_stack.insert(next);
                path.push(next);
                frames.push(Frame::new(graph, next));
            }
            None => {
                let node = frame.node;
                frames.pop();
                on_stack.remove(&node);
                path.pop();
            }
        }
    }

    None
}

/// Cycle-checked edge insertion and one-hop status derivation.
#[derive(Debug, Clone)]
pub struct DependencyEngine {
    graph: SharedGraph,
}

impl DependencyEngine {
    pub fn new(graph: SharedGraph) -> Self {
        Self { graph }
    }

    /// Handle to the underlying graph store.
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Add `task -> depends_on` unless it would close a cycle.
    ///
    /// Stage, search, roll back on failure, all under one write guard. On
    /// success returns whether the edge is new (`false` for an existing edge).
    ///
    /// # Errors
    /// - [`DependencyError::SelfDependency`] if `task == depends_on`; nothing is staged.
    /// - [`DependencyError::Cycle`] with the witness loop; the edge set is left unchanged.
    pub fn propose_edge(&self, task: TaskId, depends_on: TaskId) -> Result<bool, DependencyError> {
        if task == depends_on {
            return Err(DependencyError::SelfDependency(task));
        }

        let mut graph = graph::write(&self.graph);
        let inserted = graph.add_edge(task, depends_on)?;

        if let Some(path) = find_cycle(&graph, task) {
            if inserted {
                graph.remove_edge(task, depends_on);
            }
            warn!("rejected dependency {} -> {}: cycle {:?}", task, depends_on, path);
            return Err(DependencyError::Cycle { path });
        }

        if inserted {
            info!("committed dependency {} -> {}", task, depends_on);
        }
        Ok(inserted)
    }

    /// Remove an edge. Also the compensating action when a caller fails to
    /// persist an edge this engine committed.
    pub fn remove_edge(&self, task: TaskId, depends_on: TaskId) -> bool {
        graph::write(&self.graph).remove_edge(task, depends_on)
    }

    /// Drop every edge touching `task`.
    pub fn remove_task(&self, task: TaskId) -> Vec<(TaskId, TaskId)> {
        graph::write(&self.graph).remove_task(task)
    }

    pub fn direct_dependencies(&self, task: TaskId) -> BTreeSet<TaskId> {
        graph::read(&self.graph).direct_dependencies(task)
    }

    pub fn dependents(&self, task: TaskId) -> BTreeSet<TaskId> {
        graph::read(&self.graph).dependents(task)
    }

    /// Derived status of `task`, or `None` to keep its current status.
    ///
    /// Dependencies unknown to `lookup` are ignored.
    pub fn derive_status<L: StatusLookup + ?Sized>(&self, task: TaskId, lookup: &L) -> Option<Status> {
        let graph = graph::read(&self.graph);
        derive_with(&graph, task, lookup)
    }

    /// Recompute `task` from its current status and report the transition.
    pub fn recompute<L: StatusLookup + ?Sized>(&self, task: TaskId, current: Status, lookup: &L) -> StatusChange {
        let to = self.derive_status(task, lookup).unwrap_or(current);
        let change = StatusChange { task, from: current, to };
        if change.changed() {
            debug!("task {} derives {} -> {}", task, current, to);
        }
        change
    }

    /// Recompute and write the result into `task.status`.
    ///
    /// Holds the graph write guard so no edge mutation interleaves.
    pub fn apply_derived_status<L: StatusLookup + ?Sized>(&self, task: &mut Task, lookup: &L) -> StatusChange {
        let graph = graph::write(&self.graph);
        let from = task.status;
        if let Some(to) = derive_with(&graph, task.id, lookup) {
            task.status = to;
        }
        let change = StatusChange { task: task.id, from, to: task.status };
        if change.changed() {
            info!("task {} status {} -> {}", task.id, from, task.status);
        }
        change
    }
}

fn derive_with<L: StatusLookup + ?Sized>(graph: &GraphStore, task: TaskId, lookup: &L) -> Option<Status> {
    derive_from_statuses(graph.neighbors_ref(task).filter_map(|dep| lookup.status(dep)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn engine_with(edges: &[(TaskId, TaskId)]) -> DependencyEngine {
        let graph = GraphStore::from_edges(edges.iter().copied()).unwrap();
        DependencyEngine::new(graph.into_shared())
    }

    fn statuses(pairs: &[(TaskId, Status)]) -> HashMap<TaskId, Status> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_find_cycle_none_on_dag() {
        let graph = GraphStore::from_edges([(1, 2), (1, 3), (2, 4), (3, 4)]).unwrap();
        assert_eq!(find_cycle(&graph, 1), None);
    }

    #[test]
    fn test_find_cycle_reports_closed_loop() {
        let graph = GraphStore::from_edges([(1, 2), (2, 3), (3, 1)]).unwrap();
        assert_eq!(find_cycle(&graph, 1), Some(vec![1, 2, 3, 1]));
        assert_eq!(find_cycle(&graph, 3), Some(vec![3, 1, 2, 3]));
    }

    #[test]
    fn test_find_cycle_trims_lead_in() {
        // 1 -> 2 -> 3 -> 4 -> 2: the loop does not include the start node
        let graph = GraphStore::from_edges([(1, 2), (2, 3), (3, 4), (4, 2)]).unwrap();
        assert_eq!(find_cycle(&graph, 1), Some(vec![2, 3, 4, 2]));
    }

    #[test]
    fn test_find_cycle_skips_visited_branch() {
        // Diamond with shared tail is not a cycle
        let graph = GraphStore::from_edges([(1, 2), (1, 3), (2, 4), (3, 4), (4, 5)]).unwrap();
        assert_eq!(find_cycle(&graph, 1), None);
    }

    #[test]
    fn test_find_cycle_deep_chain_does_not_recurse() {
        let edges: Vec<_> = (1..20_000).map(|i| (i, i + 1)).collect();
        let graph = GraphStore::from_edges(edges).unwrap();
        assert_eq!(find_cycle(&graph, 1), None);
    }

    #[test]
    fn test_propose_edge_rejects_self() {
        let engine = engine_with(&[]);
        assert_eq!(engine.propose_edge(5, 5), Err(DependencyError::SelfDependency(5)));
        assert!(graph::read(engine.graph()).is_empty());
    }

    #[test]
    fn test_propose_edge_rolls_back_cycle() {
        let engine = engine_with(&[(1, 2), (2, 3)]);
        let before = graph::read(engine.graph()).clone();

        let err = engine.propose_edge(3, 1).unwrap_err();
        assert_eq!(err, DependencyError::Cycle { path: vec![3, 1, 2, 3] });
        assert_eq!(*graph::read(engine.graph()), before);
    }

    #[test]
    fn test_propose_edge_reports_new_vs_existing() {
        let engine = engine_with(&[]);
        assert_eq!(engine.propose_edge(1, 2), Ok(true));
        assert_eq!(engine.propose_edge(1, 2), Ok(false));
        assert_eq!(graph::read(engine.graph()).edge_count(), 1);
    }

    #[test]
    fn test_propose_edge_two_node_cycle() {
        let engine = engine_with(&[(1, 2)]);
        assert_eq!(
            engine.propose_edge(2, 1),
            Err(DependencyError::Cycle { path: vec![2, 1, 2] })
        );
    }

    #[test]
    fn test_derive_rule_table() {
        use Status::*;
        assert_eq!(derive_from_statuses(std::iter::empty()), None);
        assert_eq!(derive_from_statuses([Blocked, Completed]), Some(Blocked));
        assert_eq!(derive_from_statuses([Pending, Blocked]), Some(Blocked));
        assert_eq!(derive_from_statuses([Completed, Pending]), Some(Pending));
        assert_eq!(derive_from_statuses([InProgress]), Some(Pending));
        assert_eq!(derive_from_statuses([Completed, Completed]), Some(InProgress));
    }

    #[test]
    fn test_derive_status_ignores_unknown_dependencies() {
        let engine = engine_with(&[(1, 2), (1, 3)]);
        let lookup = statuses(&[(2, Status::Completed)]);
        assert_eq!(engine.derive_status(1, &lookup), Some(Status::InProgress));

        let empty = statuses(&[]);
        assert_eq!(engine.derive_status(1, &empty), None);
    }

    #[test]
    fn test_recompute_keeps_status_without_dependencies() {
        let engine = engine_with(&[]);
        let lookup = statuses(&[]);
        let change = engine.recompute(1, Status::Completed, &lookup);
        assert_eq!(change.to, Status::Completed);
        assert!(!change.changed());
    }

    #[test]
    fn test_apply_derived_status_writes_task() {
        let engine = engine_with(&[(1, 2)]);
        let lookup = statuses(&[(2, Status::Blocked)]);
        let now = Utc::now();
        let mut task = Task {
            id: 1,
            title: "Dependent".to_string(),
            description: None,
            status: Status::InProgress,
            created_at: now,
            updated_at: now,
        };

        let change = engine.apply_derived_status(&mut task, &lookup);
        assert_eq!(task.status, Status::Blocked);
        assert_eq!(change, StatusChange { task: 1, from: Status::InProgress, to: Status::Blocked });
    }

    #[test]
    fn test_dependents_and_dependencies() {
        let engine = engine_with(&[(1, 3), (2, 3)]);
        assert_eq!(engine.dependents(3).into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(engine.direct_dependencies(1).into_iter().collect::<Vec<_>>(), vec![3]);
        assert_eq!(engine.remove_task(3).len(), 2);
        assert!(engine.dependents(3).is_empty());
    }
}
