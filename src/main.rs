//! taskdeps CLI - tasks with acyclic dependencies and derived status.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use taskdeps::{DependencyError, Status, StatusChange, Store, StoreError, Task, TaskId};

mod cli;

use cli::{Cli, Command};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskdeps")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("taskdeps.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_store_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn format_status(status: &Status) -> ColoredString {
    match status {
        Status::Pending => "pending".yellow(),
        Status::InProgress => "in_progress".blue(),
        Status::Completed => "completed".green(),
        Status::Blocked => "blocked".red(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn print_changes(changes: &[StatusChange]) {
    for change in changes {
        println!(
            "  {} #{} {} -> {}",
            "↳".dimmed(),
            change.task,
            format_status(&change.from),
            format_status(&change.to)
        );
    }
}

fn print_task_line(task: &Task) {
    println!("{} #{} {}", format_status(&task.status), task.id.to_string().cyan(), task.title);
}

fn run(cli: Cli) -> Result<()> {
    let store_dir = get_store_dir(&cli);
    let json = cli.json;

    match cli.command {
        Command::Init => {
            Store::init(&store_dir).context("Failed to initialize taskdeps store")?;
            println!("{} Initialized taskdeps store in {}", "✓".green(), store_dir.display());
        }

        Command::Create { title, description } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let task = store
                .create(&title, description.as_deref())
                .context("Failed to create task")?;

            if json {
                print_json(&task)?;
            } else {
                println!("{} Created: #{} {}", "✓".green(), task.id.to_string().cyan(), task.title);
            }
        }

        Command::List { status } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let tasks = store.list(status);

            if json {
                print_json(&tasks)?;
            } else if tasks.is_empty() {
                println!("{}", "No tasks found".dimmed());
            } else {
                for task in &tasks {
                    print_task_line(task);
                }
            }
        }

        Command::Get { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let view = store
                .view(id)
                .ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(id)))?;

            if json {
                print_json(&view)?;
            } else {
                let task = &view.task;
                println!("{}: {}", "ID".bold(), task.id.to_string().cyan());
                println!("{}: {}", "Title".bold(), task.title);
                println!("{}: {}", "Status".bold(), format_status(&task.status));
                if let Some(desc) = &task.description {
                    println!("{}: {}", "Description".bold(), desc);
                }
                println!("{}: {}", "Created".bold(), task.created_at);
                println!("{}: {}", "Updated".bold(), task.updated_at);
                if !view.depends_on.is_empty() {
                    println!("{}: {}", "Depends on".bold(), join_ids(&view.depends_on));
                }
                if !view.dependents.is_empty() {
                    println!("{}: {}", "Dependents".bold(), join_ids(&view.dependents));
                }
            }
        }

        Command::Update { id, title, description } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let task = store
                .update(id, title.as_deref(), description.as_deref().map(Some))
                .context("Failed to update task")?;

            if json {
                print_json(&task)?;
            } else {
                println!("{} Updated: #{} {}", "✓".green(), task.id.to_string().cyan(), task.title);
            }
        }

        Command::Status { id, status } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let (task, changes) = store.set_status(id, status).context("Failed to set status")?;

            if json {
                print_json(&serde_json::json!({ "task": task, "cascaded": changes }))?;
            } else {
                println!("{} #{} is now {}", "→".blue(), task.id.to_string().cyan(), format_status(&task.status));
                print_changes(&changes);
            }
        }

        Command::Delete { id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let (task, changes) = store.delete(id).context("Failed to delete task")?;

            if json {
                print_json(&serde_json::json!({ "deleted": task, "cascaded": changes }))?;
            } else {
                println!("{} Deleted: #{} {}", "✓".green(), task.id.to_string().cyan(), task.title);
                print_changes(&changes);
            }
        }

        Command::Depend { task_id, depends_on_id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let dependency = store.add_dependency(task_id, depends_on_id)?;

            if json {
                print_json(&dependency)?;
            } else {
                println!(
                    "{} #{} now depends on #{}",
                    "✓".green(),
                    task_id.to_string().cyan(),
                    depends_on_id.to_string().cyan()
                );
                if let Some(task) = store.get(task_id) {
                    println!("  status: {}", format_status(&task.status));
                }
            }
        }

        Command::Undepend { task_id, depends_on_id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let change = store.remove_dependency(task_id, depends_on_id)?;

            if json {
                print_json(&change)?;
            } else {
                println!(
                    "{} #{} no longer depends on #{}",
                    "✓".green(),
                    task_id.to_string().cyan(),
                    depends_on_id.to_string().cyan()
                );
                if change.changed() {
                    print_changes(&[change]);
                }
            }
        }

        Command::Deps => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let dependencies = store.dependencies().context("Failed to list dependencies")?;

            if json {
                print_json(&dependencies)?;
            } else if dependencies.is_empty() {
                println!("{}", "No dependencies".dimmed());
            } else {
                for dep in &dependencies {
                    println!(
                        "#{} {} #{}",
                        dep.task_id.to_string().cyan(),
                        "depends on".dimmed(),
                        dep.depends_on_id.to_string().cyan()
                    );
                }
            }
        }

        Command::Derive { id } => {
            let mut store = Store::open(&store_dir).context("Failed to open store")?;
            let change = store.derive(id).context("Failed to derive status")?;

            if json {
                print_json(&change)?;
            } else if change.changed() {
                print_changes(&[change]);
            } else {
                println!("#{} unchanged: {}", change.task.to_string().cyan(), format_status(&change.to));
            }
        }
    }

    Ok(())
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(|id| format!("#{}", id)).collect::<Vec<_>>().join(", ")
}

fn report(err: &eyre::Report) {
    if let Some(StoreError::Dependency(DependencyError::Cycle { path })) = err.downcast_ref::<StoreError>() {
        eprintln!("{} Circular dependency detected", "Error:".red().bold());
        eprintln!("  path: {}", join_ids(path));
        return;
    }
    eprintln!("{} {:#}", "Error:".red().bold(), err);
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        report(&e);
        std::process::exit(1);
    }

    Ok(())
}
