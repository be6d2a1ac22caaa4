//! In-memory dependency edge set.
//!
//! Edges point from a task to the task it depends on. Adjacency is kept in
//! sorted sets so every enumeration is in ascending id order.

use crate::types::{DependencyError, TaskId};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Graph store shared between the engine and its callers.
pub type SharedGraph = Arc<RwLock<GraphStore>>;

/// Authoritative set of `task -> depends_on` edges.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GraphStore {
    /// task -> tasks it depends on
    forward: BTreeMap<TaskId, BTreeSet<TaskId>>,
    /// task -> tasks that depend on it
    reverse: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing pairs. Self-edges are refused.
    pub fn from_edges(edges: impl IntoIterator<Item = (TaskId, TaskId)>) -> Result<Self, DependencyError> {
        let mut graph = Self::new();
        for (task, depends_on) in edges {
            graph.add_edge(task, depends_on)?;
        }
        Ok(graph)
    }

    /// Wrap this store for sharing with a [`crate::DependencyEngine`].
    pub fn into_shared(self) -> SharedGraph {
        Arc::new(RwLock::new(self))
    }

    /// Insert `task -> depends_on`. Returns false if the edge was already present.
    pub fn add_edge(&mut self, task: TaskId, depends_on: TaskId) -> Result<bool, DependencyError> {
        if task == depends_on {
            return Err(DependencyError::InvalidEdge { task, depends_on });
        }

        let inserted = self.forward.entry(task).or_default().insert(depends_on);
        if inserted {
            self.reverse.entry(depends_on).or_default().insert(task);
            debug!("graph: added edge {} -> {}", task, depends_on);
        }
        Ok(inserted)
    }

    /// Delete `task -> depends_on`. Returns false if there was nothing to delete.
    pub fn remove_edge(&mut self, task: TaskId, depends_on: TaskId) -> bool {
        let removed = detach(&mut self.forward, task, depends_on);
        if removed {
            detach(&mut self.reverse, depends_on, task);
            debug!("graph: removed edge {} -> {}", task, depends_on);
        }
        removed
    }

    /// Drop every edge touching `task`, in either direction.
    pub fn remove_task(&mut self, task: TaskId) -> Vec<(TaskId, TaskId)> {
        let mut removed = Vec::new();

        if let Some(deps) = self.forward.remove(&task) {
            for depends_on in deps {
                detach(&mut self.reverse, depends_on, task);
                removed.push((task, depends_on));
            }
        }
        if let Some(dependents) = self.reverse.remove(&task) {
            for dependent in dependents {
                detach(&mut self.forward, dependent, task);
                removed.push((dependent, task));
            }
        }

        if !removed.is_empty() {
            debug!("graph: cascade removed {} edge(s) of task {}", removed.len(), task);
        }
        removed
    }

    /// Tasks `task` directly depends on. Adjacency for graph search.
    pub fn neighbors(&self, task: TaskId) -> BTreeSet<TaskId> {
        self.forward.get(&task).cloned().unwrap_or_default()
    }

    /// Tasks `task` directly depends on. Input to status derivation.
    pub fn direct_dependencies(&self, task: TaskId) -> BTreeSet<TaskId> {
        self.neighbors(task)
    }

    /// Tasks that directly depend on `task`.
    pub fn dependents(&self, task: TaskId) -> BTreeSet<TaskId> {
        self.reverse.get(&task).cloned().unwrap_or_default()
    }

    pub fn contains_edge(&self, task: TaskId, depends_on: TaskId) -> bool {
        self.forward.get(&task).is_some_and(|deps| deps.contains(&depends_on))
    }

    /// All edges, ordered by `(task, depends_on)`.
    pub fn edges(&self) -> Vec<(TaskId, TaskId)> {
        self.forward
            .iter()
            .flat_map(|(&task, deps)| deps.iter().map(move |&depends_on| (task, depends_on)))
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Borrow the adjacency of `task` without cloning.
    pub(crate) fn neighbors_ref(&self, task: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.forward.get(&task).into_iter().flatten().copied()
    }
}

fn detach(map: &mut BTreeMap<TaskId, BTreeSet<TaskId>>, key: TaskId, value: TaskId) -> bool {
    let Some(set) = map.get_mut(&key) else {
        return false;
    };
    let removed = set.remove(&value);
    if set.is_empty() {
        map.remove(&key);
    }
    removed
}

/// Take the read guard, recovering from poisoning.
pub(crate) fn read(graph: &SharedGraph) -> RwLockReadGuard<'_, GraphStore> {
    graph.read().unwrap_or_else(|poisoned| {
        warn!("graph lock poisoned; continuing with inner state");
        poisoned.into_inner()
    })
}

/// Take the write guard, recovering from poisoning.
pub(crate) fn write(graph: &SharedGraph) -> RwLockWriteGuard<'_, GraphStore> {
    graph.write().unwrap_or_else(|poisoned| {
        warn!("graph lock poisoned; continuing with inner state");
        poisoned.into_inner()
    })
}
