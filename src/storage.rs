//! Storage layer for taskdeps: SQLite tables for tasks and dependency rows.

use crate::types::{Dependency, Status, Task, TaskId};
use chrono::{DateTime, SecondsFormat, Utc};
use eyre::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;

/// Storage directory name.
pub const STORE_DIR: &str = ".taskdeps";

/// SQLite database file.
pub const DB_FILE: &str = "taskdeps.db";

const TASK_COLUMNS: &str = "id, title, description, status, created_at, updated_at";

/// Storage handle for reading/writing task data.
pub struct Storage {
    db: Connection,
}

impl Storage {
    /// Initialize storage in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let store_dir = root.join(STORE_DIR);
        fs::create_dir_all(&store_dir).context("Failed to create .taskdeps directory")?;

        let db = Connection::open(store_dir.join(DB_FILE)).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    /// Open existing storage.
    pub fn open(root: &Path) -> Result<Self> {
        let store_dir = root.join(STORE_DIR);
        if !store_dir.exists() {
            eyre::bail!("No .taskdeps directory found. Run 'td init' first.");
        }

        let db = Connection::open(store_dir.join(DB_FILE)).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    /// Storage backed by a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        let storage = Self { db };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'completed', 'blocked')),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS dependencies (
                    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    depends_on_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (task_id, depends_on_id),
                    CHECK (task_id <> depends_on_id)
                );
                CREATE INDEX IF NOT EXISTS idx_dependencies_depends_on ON dependencies(depends_on_id);
            "#,
            )
            .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Insert a new task row. The returned task carries the assigned id.
    pub fn insert_task(
        &self,
        title: &str,
        description: Option<&str>,
        status: Status,
        created_at: DateTime<Utc>,
    ) -> Result<Task> {
        self.db
            .execute(
                "INSERT INTO tasks (title, description, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
                params![
                    title,
                    description,
                    status.as_str(),
                    format_timestamp(created_at),
                    format_timestamp(created_at),
                ],
            )
            .context("Failed to insert task")?;

        Ok(Task {
            id: self.db.last_insert_rowid(),
            title: title.to_string(),
            description: description.map(String::from),
            status,
            created_at,
            updated_at: created_at,
        })
    }

    /// Overwrite the mutable columns of an existing task.
    pub fn update_task(&self, task: &Task) -> Result<()> {
        let changed = self
            .db
            .execute(
                "UPDATE tasks SET title = ?, description = ?, status = ?, updated_at = ? WHERE id = ?",
                params![
                    task.title,
                    task.description,
                    task.status.as_str(),
                    format_timestamp(task.updated_at),
                    task.id,
                ],
            )
            .context("Failed to update task")?;

        if changed == 0 {
            eyre::bail!("task {} does not exist in storage", task.id);
        }
        Ok(())
    }

    /// Write several status changes in one transaction.
    pub fn update_statuses(&mut self, changes: &[(TaskId, Status)], updated_at: DateTime<Utc>) -> Result<()> {
        let tx = self.db.transaction().context("Failed to begin transaction")?;
        {
            let mut stmt = tx.prepare("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")?;
            let stamp = format_timestamp(updated_at);
            for (id, status) in changes {
                stmt.execute(params![status.as_str(), stamp, id])
                    .with_context(|| format!("Failed to update status of task {}", id))?;
            }
        }
        tx.commit().context("Failed to commit status changes")?;
        Ok(())
    }

    /// Delete a task. Its dependency rows go with it.
    pub fn delete_task(&self, id: TaskId) -> Result<bool> {
        let deleted = self
            .db
            .execute("DELETE FROM tasks WHERE id = ?", params![id])
            .context("Failed to delete task")?;
        Ok(deleted > 0)
    }

    /// All tasks, newest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let sql = format!("SELECT {} FROM tasks ORDER BY created_at DESC, id DESC", TASK_COLUMNS);
        let mut stmt = self.db.prepare(&sql)?;
        let tasks = stmt
            .query_map([], Self::row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read tasks")?;
        Ok(tasks)
    }

    /// Insert a dependency row. Returns false if the pair already existed.
    pub fn insert_dependency(&self, dependency: &Dependency) -> Result<bool> {
        let inserted = self
            .db
            .execute(
                "INSERT INTO dependencies (task_id, depends_on_id, created_at) VALUES (?, ?, ?)
                 ON CONFLICT (task_id, depends_on_id) DO NOTHING",
                params![
                    dependency.task_id,
                    dependency.depends_on_id,
                    format_timestamp(dependency.created_at),
                ],
            )
            .context("Failed to insert dependency")?;
        Ok(inserted > 0)
    }

    /// Delete a dependency row. Returns false if it was absent.
    pub fn delete_dependency(&self, task_id: TaskId, depends_on_id: TaskId) -> Result<bool> {
        let deleted = self
            .db
            .execute(
                "DELETE FROM dependencies WHERE task_id = ? AND depends_on_id = ?",
                params![task_id, depends_on_id],
            )
            .context("Failed to delete dependency")?;
        Ok(deleted > 0)
    }

    /// Get a single dependency row.
    pub fn get_dependency(&self, task_id: TaskId, depends_on_id: TaskId) -> Result<Option<Dependency>> {
        let dependency = self
            .db
            .query_row(
                "SELECT task_id, depends_on_id, created_at FROM dependencies WHERE task_id = ? AND depends_on_id = ?",
                params![task_id, depends_on_id],
                Self::row_to_dependency,
            )
            .optional()
            .context("Failed to query dependency")?;
        Ok(dependency)
    }

    /// All dependency rows ordered by `(task_id, depends_on_id)`.
    pub fn list_dependencies(&self) -> Result<Vec<Dependency>> {
        let mut stmt = self
            .db
            .prepare("SELECT task_id, depends_on_id, created_at FROM dependencies ORDER BY task_id, depends_on_id")?;
        let deps = stmt
            .query_map([], Self::row_to_dependency)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read dependencies")?;
        Ok(deps)
    }

    /// Convert a database row to a Task.
    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let status_str: String = row.get(3)?;
        let status = status_str
            .parse::<Status>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;

        Ok(Task {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status,
            created_at: parse_timestamp(row, 4)?,
            updated_at: parse_timestamp(row, 5)?,
        })
    }

    /// Convert a database row to a Dependency.
    fn row_to_dependency(row: &rusqlite::Row) -> rusqlite::Result<Dependency> {
        Ok(Dependency {
            task_id: row.get(0)?,
            depends_on_id: row.get(1)?,
            created_at: parse_timestamp(row, 2)?,
        })
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
