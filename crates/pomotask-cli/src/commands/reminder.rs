use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use pomotask_core::notify::LogNotifier;
use pomotask_core::storage::{Config, Database};
use pomotask_core::ReminderScheduler;

use super::{display_ts, CmdResult};

#[derive(Subcommand)]
pub enum ReminderAction {
    /// List pending reminders
    List {
        /// Include reminders that were already sent
        #[arg(long)]
        all: bool,
    },
    /// Process due reminders once and exit
    Check,
}

pub fn run(action: ReminderAction) -> CmdResult {
    let db = Arc::new(Database::open()?);
    match action {
        ReminderAction::List { all } => {
            let reminders = db.list_reminders(all)?;
            if reminders.is_empty() {
                println!("No reminders.");
            }
            for reminder in reminders {
                let task = reminder
                    .task_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".into());
                let state = if reminder.sent { "sent" } else { "pending" };
                println!(
                    "{:>4}  task {task:>4}  {}  {state}",
                    reminder.id,
                    display_ts(reminder.remind_at)
                );
            }
        }
        ReminderAction::Check => {
            let config = Config::load_or_default();
            let scheduler = ReminderScheduler::new(db, Arc::new(LogNotifier));
            scheduler.update_config(None, Some(config.scheduler.notifications_enabled));
            let report = scheduler.run_iteration(Utc::now())?;
            println!(
                "{} due, {} notified, {} marked sent",
                report.due, report.notified, report.marked
            );
        }
    }
    Ok(())
}
