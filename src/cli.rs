//! CLI argument parsing for taskdeps.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskdeps::{Status, TaskId};

#[derive(Parser)]
#[command(
    name = "td",
    about = "Track tasks and the dependencies between them",
    version,
    after_help = "Logs are written to: ~/.local/share/taskdeps/logs/taskdeps.log"
)]
pub struct Cli {
    /// Path to the store directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new store in the current directory
    Init,

    /// Create a new task
    Create {
        /// Task title
        title: String,

        /// Description
        #[arg(short = 'D', long)]
        description: Option<String>,
    },

    /// List tasks, newest first
    List {
        /// Filter by status (pending, in_progress, completed, blocked)
        #[arg(short, long)]
        status: Option<Status>,
    },

    /// Show a task with its dependencies and dependents
    Get {
        /// Task ID
        id: TaskId,
    },

    /// Change a task's title or description
    Update {
        /// Task ID
        id: TaskId,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New description
        #[arg(short = 'D', long)]
        description: Option<String>,
    },

    /// Set a task's status and re-derive the tasks that depend on it
    Status {
        /// Task ID
        id: TaskId,

        /// New status (pending, in_progress, completed, blocked)
        status: Status,
    },

    /// Delete a task and its dependencies
    Delete {
        /// Task ID
        id: TaskId,
    },

    /// Add a dependency
    Depend {
        /// Task that depends
        task_id: TaskId,

        /// Task it depends on
        depends_on_id: TaskId,
    },

    /// Remove a dependency
    Undepend {
        /// Task that depends
        task_id: TaskId,

        /// Task it depends on
        depends_on_id: TaskId,
    },

    /// List all dependencies
    Deps,

    /// Recompute a task's status from its direct dependencies
    Derive {
        /// Task ID
        id: TaskId,
    },
}
