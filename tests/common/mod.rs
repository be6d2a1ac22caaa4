//! Shared test infrastructure for taskdeps integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use taskdeps::{Dependency, DependencyError, Status, Store, StoreError, Task, TaskId};
use tempfile::TempDir;

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
}

impl TestEnv {
    /// Create a new test environment with an initialized store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::init(temp_dir.path()).expect("Failed to init store");
        Self { temp_dir, store }
    }

    /// Create a task with no description.
    pub fn create_task(&mut self, title: &str) -> Task {
        self.store.create(title, None).expect("Failed to create task")
    }

    /// Create a task and set its status explicitly.
    pub fn create_task_with_status(&mut self, title: &str, status: Status) -> Task {
        let task = self.create_task(title);
        let (task, _) = self.store.set_status(task.id, status).expect("Failed to set status");
        task
    }

    /// Add a dependency (from depends on to).
    pub fn depend(&mut self, from: &Task, to: &Task) -> Dependency {
        self.store
            .add_dependency(from.id, to.id)
            .expect("Failed to add dependency")
    }

    /// Try to add a dependency and return the cycle witness it was rejected with.
    pub fn expect_cycle(&mut self, from: &Task, to: &Task) -> Vec<TaskId> {
        let err = self
            .store
            .add_dependency(from.id, to.id)
            .expect_err("Expected dependency to be rejected");
        match err.downcast_ref::<StoreError>() {
            Some(StoreError::Dependency(DependencyError::Cycle { path })) => path.clone(),
            other => panic!("Expected a cycle error, got {:?}", other),
        }
    }

    /// Reload the task from the store.
    pub fn status_of(&self, task: &Task) -> Status {
        self.store.get(task.id).expect("Task disappeared").status
    }

    /// All committed edges as pairs.
    pub fn edges(&self) -> Vec<(TaskId, TaskId)> {
        self.store
            .dependencies()
            .expect("Failed to list dependencies")
            .into_iter()
            .map(|d| (d.task_id, d.depends_on_id))
            .collect()
    }

    /// Assert that a task has the given status.
    pub fn assert_status(&self, task: &Task, expected: Status) {
        let actual = self.status_of(task);
        assert_eq!(
            actual, expected,
            "Expected task {} to be {}, but it was {}",
            task.id, expected, actual
        );
    }

    /// Get all tasks count.
    pub fn total_count(&self) -> usize {
        self.store.list(None).len()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
