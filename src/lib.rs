//! taskdeps: tasks, dependencies between them, and derived status.
//!
//! The dependency relation is kept acyclic: every new edge is staged, checked
//! with a depth-first search and rolled back if it would close a loop. A task's
//! status is derived from its direct dependencies (one hop, never recursive).
//!
//! # Example
//!
//! ```no_run
//! use taskdeps::{Status, Store};
//! use std::path::Path;
//!
//! // Initialize a new store
//! let mut store = Store::init(Path::new(".")).unwrap();
//!
//! let design = store.create("Design schema", None).unwrap();
//! let migrate = store.create("Write migration", None).unwrap();
//!
//! // migrate depends on design
//! store.add_dependency(migrate.id, design.id).unwrap();
//!
//! // The reverse edge would close a loop
//! assert!(store.add_dependency(design.id, migrate.id).is_err());
//!
//! // Completing the dependency moves the dependent to in_progress
//! let (_, changes) = store.set_status(design.id, Status::Completed).unwrap();
//! assert_eq!(changes[0].to, Status::InProgress);
//! ```

mod engine;
mod graph;
mod storage;
mod store;
mod types;

// Re-export public API
pub use engine::{DependencyEngine, StatusLookup, derive_from_statuses, find_cycle};
pub use graph::{GraphStore, SharedGraph};
pub use storage::{DB_FILE, STORE_DIR};
pub use store::{Store, StoreError};
pub use types::{
    Dependency, DependencyError, MAX_TITLE_LEN, Status, StatusChange, Task, TaskId, TaskView, ValidationError,
};
