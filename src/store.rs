//! High-level store API for taskdeps.
//!
//! `Store` is the CRUD layer around the dependency core: it keeps tasks and
//! dependency rows in SQLite, mirrors the edges into the shared graph, and
//! decides which tasks get their status re-derived.

use crate::engine::DependencyEngine;
use crate::graph::GraphStore;
use crate::storage::Storage;
use crate::types::{Dependency, DependencyError, Status, StatusChange, Task, TaskId, TaskView, ValidationError};
use chrono::Utc;
use eyre::{Context, Result};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Errors that can occur during store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Task not found.
    TaskNotFound(TaskId),
    /// No dependency row for this pair.
    DependencyNotFound { task: TaskId, depends_on: TaskId },
    /// Rejected by the dependency engine.
    Dependency(DependencyError),
    /// Validation error.
    Validation(ValidationError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::TaskNotFound(id) => write!(f, "task not found: {}", id),
            StoreError::DependencyNotFound { task, depends_on } => {
                write!(f, "task {} does not depend on {}", task, depends_on)
            }
            StoreError::Dependency(e) => write!(f, "{}", e),
            StoreError::Validation(e) => write!(f, "validation error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// The main taskdeps store.
pub struct Store {
    storage: Storage,
    tasks: BTreeMap<TaskId, Task>,
    engine: DependencyEngine,
}

impl Store {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        Self::load(Storage::init(root)?)
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        Self::load(Storage::open(root)?)
    }

    /// A store that lives only as long as the value.
    pub fn in_memory() -> Result<Self> {
        Self::load(Storage::in_memory()?)
    }

    /// Read every task and dependency row, admitting edges through the engine.
    fn load(storage: Storage) -> Result<Self> {
        let tasks: BTreeMap<TaskId, Task> = storage
            .list_tasks()
            .context("Failed to load tasks")?
            .into_iter()
            .map(|task| (task.id, task))
            .collect();

        let engine = DependencyEngine::new(GraphStore::new().into_shared());
        let rows = storage.list_dependencies().context("Failed to load dependencies")?;
        for row in &rows {
            engine
                .propose_edge(row.task_id, row.depends_on_id)
                .map_err(|e| eyre::eyre!(StoreError::Dependency(e)))
                .context("Stored dependencies are not acyclic")?;
        }

        debug!("loaded {} task(s), {} dependency row(s)", tasks.len(), rows.len());
        Ok(Self { storage, tasks, engine })
    }

    /// Ids `id` directly depends on, ascending.
    pub fn direct_dependencies(&self, id: TaskId) -> BTreeSet<TaskId> {
        self.engine.direct_dependencies(id)
    }

    /// Ids that directly depend on `id`, ascending.
    pub fn dependents(&self, id: TaskId) -> BTreeSet<TaskId> {
        self.engine.dependents(id)
    }

    /// Create a new task with status Pending.
    pub fn create(&mut self, title: &str, description: Option<&str>) -> Result<Task> {
        let now = Utc::now();
        let draft = Task {
            id: 0,
            title: title.to_string(),
            description: description.map(String::from),
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        };

        // Validate before persisting
        draft.validate().map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;

        let task = self
            .storage
            .insert_task(title, description, draft.status, now)
            .context("Failed to persist task")?;

        info!("created task {} '{}'", task.id, task.title);
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    /// Get a task by ID.
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.get(&id).cloned()
    }

    /// A task with the ids it depends on and the ids depending on it.
    pub fn view(&self, id: TaskId) -> Option<TaskView> {
        let task = self.tasks.get(&id)?.clone();
        Some(TaskView {
            task,
            depends_on: self.direct_dependencies(id).into_iter().collect(),
            dependents: self.dependents(id).into_iter().collect(),
        })
    }

    /// List tasks, newest first, with optional status filter.
    pub fn list(&self, status_filter: Option<Status>) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| status_filter.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        tasks
    }

    /// Update a task's title and/or description.
    pub fn update(&mut self, id: TaskId, title: Option<&str>, description: Option<Option<&str>>) -> Result<Task> {
        let existing = self.require(id)?;

        let updated = Task {
            title: title.map(String::from).unwrap_or(existing.title),
            description: match description {
                Some(d) => d.map(String::from),
                None => existing.description,
            },
            updated_at: Utc::now(),
            ..existing
        };

        // Validate before persisting
        updated.validate().map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;

        self.storage
            .update_task(&updated)
            .context("Failed to persist updated task")?;
        self.tasks.insert(id, updated.clone());
        Ok(updated)
    }

    /// Explicitly set a task's status, then re-derive its direct dependents.
    ///
    /// Only one hop: each dependent is recomputed once against the statuses
    /// as they stand after this change. Returns the updated task and the
    /// dependents whose status moved.
    pub fn set_status(&mut self, id: TaskId, status: Status) -> Result<(Task, Vec<StatusChange>)> {
        let existing = self.require(id)?;
        let from = existing.status;

        let updated = Task {
            status,
            updated_at: Utc::now(),
            ..existing
        };
        self.storage
            .update_task(&updated)
            .context("Failed to persist status change")?;
        self.tasks.insert(id, updated.clone());
        info!("task {} status {} -> {}", id, from, status);

        let cascaded = self.rederive_dependents(id)?;
        Ok((updated, cascaded))
    }

    /// Delete a task and every dependency touching it.
    ///
    /// Former dependents are re-derived once, since their dependency set shrank.
    pub fn delete(&mut self, id: TaskId) -> Result<(Task, Vec<StatusChange>)> {
        let existing = self.require(id)?;
        let dependents = self.engine.dependents(id);

        self.storage.delete_task(id).context("Failed to delete task")?;
        let removed = self.engine.remove_task(id);
        self.tasks.remove(&id);
        info!("deleted task {} and {} dependency edge(s)", id, removed.len());

        let changes = self.rederive(dependents)?;
        Ok((existing, changes))
    }

    /// Record that `task_id` depends on `depends_on_id`.
    ///
    /// Adding an existing dependency returns the existing row. Once the row is
    /// stored the task's own status is re-derived; a failure there is logged
    /// and the committed row is still returned.
    pub fn add_dependency(&mut self, task_id: TaskId, depends_on_id: TaskId) -> Result<Dependency> {
        if task_id == depends_on_id {
            return Err(eyre::eyre!(StoreError::Dependency(DependencyError::SelfDependency(
                task_id
            ))));
        }
        self.require(task_id)?;
        self.require(depends_on_id)?;

        let inserted = self
            .engine
            .propose_edge(task_id, depends_on_id)
            .map_err(|e| eyre::eyre!(StoreError::Dependency(e)))?;

        let row = Dependency {
            task_id,
            depends_on_id,
            created_at: Utc::now(),
        };
        if let Err(e) = self.storage.insert_dependency(&row) {
            // Only undo what this call committed
            if inserted {
                self.engine.remove_edge(task_id, depends_on_id);
            }
            return Err(e).context("Failed to persist dependency");
        }

        if let Err(e) = self.derive(task_id) {
            warn!("dependency {} -> {} stored but status not re-derived: {:#}", task_id, depends_on_id, e);
        }

        self.storage
            .get_dependency(task_id, depends_on_id)?
            .ok_or_else(|| eyre::eyre!("dependency {} -> {} missing after insert", task_id, depends_on_id))
    }

    /// Remove a dependency and re-derive the task that had it.
    pub fn remove_dependency(&mut self, task_id: TaskId, depends_on_id: TaskId) -> Result<StatusChange> {
        let missing = || {
            eyre::eyre!(StoreError::DependencyNotFound {
                task: task_id,
                depends_on: depends_on_id,
            })
        };

        if !self.engine.remove_edge(task_id, depends_on_id) {
            return Err(missing());
        }
        if let Err(e) = self.storage.delete_dependency(task_id, depends_on_id) {
            // Keep the graph in step with storage
            self.engine
                .propose_edge(task_id, depends_on_id)
                .map_err(|e| eyre::eyre!(StoreError::Dependency(e)))?;
            return Err(e);
        }

        info!("removed dependency {} -> {}", task_id, depends_on_id);
        self.derive(task_id)
    }

    /// All dependency rows.
    pub fn dependencies(&self) -> Result<Vec<Dependency>> {
        self.storage.list_dependencies()
    }

    /// Recompute one task's status from its direct dependencies and persist it.
    pub fn derive(&mut self, id: TaskId) -> Result<StatusChange> {
        let current = self.require(id)?.status;
        let change = self.engine.recompute(id, current, &self.tasks);
        if change.changed() {
            self.apply(&[change])?;
        }
        Ok(change)
    }

    fn rederive_dependents(&mut self, id: TaskId) -> Result<Vec<StatusChange>> {
        let dependents = self.engine.dependents(id);
        self.rederive(dependents)
    }

    /// Recompute each task against one snapshot of statuses, then persist.
    fn rederive(&mut self, ids: impl IntoIterator<Item = TaskId>) -> Result<Vec<StatusChange>> {
        let changes: Vec<StatusChange> = ids
            .into_iter()
            .filter_map(|dep| self.tasks.get(&dep).map(|t| (dep, t.status)))
            .map(|(dep, current)| self.engine.recompute(dep, current, &self.tasks))
            .filter(StatusChange::changed)
            .collect();

        self.apply(&changes)?;
        Ok(changes)
    }

    fn apply(&mut self, changes: &[StatusChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let rows: Vec<(TaskId, Status)> = changes.iter().map(|c| (c.task, c.to)).collect();
        self.storage
            .update_statuses(&rows, now)
            .context("Failed to persist derived statuses")?;

        for change in changes {
            if let Some(task) = self.tasks.get_mut(&change.task) {
                task.status = change.to;
                task.updated_at = now;
            }
            info!("task {} derived status {} -> {}", change.task, change.from, change.to);
        }
        Ok(())
    }

    fn require(&self, id: TaskId) -> Result<Task> {
        self.tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(id)))
    }
}
