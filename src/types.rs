//! Core data types for the taskdeps graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Task identifier. Assigned by storage, always positive.
pub type TaskId = i64;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// A unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,

    /// Short description of the work
    pub title: String,

    /// Optional longer description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Current state. The only field the dependency engine writes.
    pub status: Status,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Task status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Pending, Status::InProgress, Status::Completed, Status::Blocked];

    /// Stable text form, shared by storage and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "blocked" => Ok(Status::Blocked),
            other => Err(format!(
                "unknown status '{}': expected pending, in_progress, completed or blocked",
                other
            )),
        }
    }
}

/// A persisted dependency row: `task_id` depends on `depends_on_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dependency {
    /// The task that has the dependency
    pub task_id: TaskId,

    /// The task being depended on
    pub depends_on_id: TaskId,

    pub created_at: DateTime<Utc>,
}

/// A task together with its adjacency in both directions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,

    /// Tasks this task depends on
    pub depends_on: Vec<TaskId>,

    /// Tasks that depend on this task
    pub dependents: Vec<TaskId>,
}

/// Outcome of a status recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub task: TaskId,
    pub from: Status,
    pub to: Status,
}

impl StatusChange {
    /// True when the recomputation moved the task to a different status.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Errors raised by the dependency graph core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    /// A task was asked to depend on itself.
    SelfDependency(TaskId),
    /// The edge would close a loop. `path` starts and ends at the same task.
    Cycle { path: Vec<TaskId> },
    /// Malformed edge refused by the graph store.
    InvalidEdge { task: TaskId, depends_on: TaskId },
}

impl fmt::Display for DependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyError::SelfDependency(id) => write!(f, "task {} cannot depend on itself", id),
            DependencyError::Cycle { path } => {
                let rendered: Vec<String> = path.iter().map(|id| id.to_string()).collect();
                write!(f, "circular dependency detected: {}", rendered.join(" -> "))
            }
            DependencyError::InvalidEdge { task, depends_on } => {
                write!(f, "invalid dependency edge {} -> {}", task, depends_on)
            }
        }
    }
}

impl std::error::Error for DependencyError {}

/// Validation errors for tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyTitle,
    TitleTooLong,
    InvalidCharacters,
    InvalidTimestamp,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyTitle => write!(f, "title cannot be empty"),
            ValidationError::TitleTooLong => write!(f, "title exceeds {} characters", MAX_TITLE_LEN),
            ValidationError::InvalidCharacters => write!(f, "title contains control characters"),
            ValidationError::InvalidTimestamp => write!(f, "updated_at cannot be before created_at"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl Task {
    /// Validate the task's fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong);
        }
        if self.title.chars().any(|c| c.is_control()) {
            return Err(ValidationError::InvalidCharacters);
        }
        if self.updated_at < self.created_at {
            return Err(ValidationError::InvalidTimestamp);
        }
        Ok(())
    }
}
