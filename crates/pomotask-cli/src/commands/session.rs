use clap::Subcommand;
use pomotask_core::storage::Database;

use super::{display_ts, CmdResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Show recent focus and break intervals
    List {
        /// Maximum number of entries
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: SessionAction) -> CmdResult {
    let db = Database::open()?;
    match action {
        SessionAction::List { limit, json } => {
            let sessions = db.list_recent_sessions(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
                return Ok(());
            }
            if sessions.is_empty() {
                println!("No sessions logged.");
            }
            for entry in sessions {
                let task = entry.task_title.as_deref().unwrap_or("-");
                println!(
                    "{}  {:>3} min  {:<24}  {task}",
                    display_ts(entry.started_at),
                    entry.duration_minutes,
                    entry.note
                );
            }
        }
    }
    Ok(())
}
