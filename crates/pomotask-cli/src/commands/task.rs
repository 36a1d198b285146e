use clap::Subcommand;
use pomotask_core::storage::Database;

use super::{display_ts, parse_due, CmdResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a task
    Add {
        /// Task title
        title: String,
        /// Longer description
        #[arg(long, default_value = "")]
        description: String,
        /// Due time (RFC 3339 or "YYYY-MM-DD HH:MM" local); schedules a reminder
        #[arg(long)]
        due: Option<String>,
    },
    /// List tasks, soonest due first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Maximum number of tasks
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Set or clear a task's due time
    Due {
        /// Task ID
        id: i64,
        /// New due time
        #[arg(required_unless_present = "clear", conflicts_with = "clear")]
        at: Option<String>,
        /// Remove the due time and its pending reminder
        #[arg(long)]
        clear: bool,
    },
    /// Mark a task as done
    Done {
        /// Task ID
        id: i64,
    },
    /// Delete a task and its reminders
    Delete {
        /// Task ID
        id: i64,
    },
}

pub fn run(action: TaskAction) -> CmdResult {
    let db = Database::open()?;
    match action {
        TaskAction::Add {
            title,
            description,
            due,
        } => {
            let due_at = due.as_deref().map(parse_due).transpose()?;
            let id = db.add_task(&title, &description, due_at)?;
            println!("Task created: {id}");
        }
        TaskAction::List { json, limit } => {
            let tasks = db.list_tasks(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
                return Ok(());
            }
            if tasks.is_empty() {
                println!("No tasks.");
                return Ok(());
            }
            for task in tasks {
                let mark = if task.completed { "x" } else { " " };
                let due = task
                    .due_at
                    .map(|at| format!("  due {}", display_ts(at)))
                    .unwrap_or_default();
                println!("[{mark}] {:>4}  {}{due}", task.id, task.title);
            }
        }
        TaskAction::Due { id, at, clear } => {
            let due_at = if clear {
                None
            } else {
                at.as_deref().map(parse_due).transpose()?
            };
            db.set_task_due(id, due_at)?;
            match due_at {
                Some(at) => println!("Task {id} due {}", display_ts(at)),
                None => println!("Task {id} due time cleared"),
            }
        }
        TaskAction::Done { id } => {
            db.complete_task(id)?;
            println!("Task {id} completed");
        }
        TaskAction::Delete { id } => {
            if !db.delete_task(id)? {
                return Err(format!("task {id} not found").into());
            }
            println!("Task {id} deleted");
        }
    }
    Ok(())
}
