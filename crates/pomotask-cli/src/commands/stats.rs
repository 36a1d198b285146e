use chrono::Utc;
use pomotask_core::storage::Database;

use super::CmdResult;

pub fn run() -> CmdResult {
    let db = Database::open()?;
    let now = Utc::now();
    let open = db.count_open_tasks()?;
    let due_today = db.count_due_today(now)?;
    let sessions_today = db.count_sessions_today(now)?;

    println!("Open tasks:     {open}");
    println!("Due today:      {due_today}");
    println!("Sessions today: {sessions_today}");
    Ok(())
}
