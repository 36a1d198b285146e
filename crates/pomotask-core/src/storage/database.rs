//! SQLite-backed store for tasks, reminders and session logs.
//!
//! Provides persistent storage for:
//! - Tasks and their due timestamps
//! - Reminders (one unsent row per task at most)
//! - Completed focus/break intervals
//! - Key-value store for host state
//!
//! The connection lives behind a mutex so one `Database` can be shared via
//! `Arc` between the host and both background loops.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, DurationRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::store::{DueReminder, NewSessionLog, ReminderStore, SessionStore};
use super::{data_dir, migrations, opt_ts_column, to_sql_ts, ts_column};
use crate::error::{CoreError, DatabaseError, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub due_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub task_id: Option<i64>,
    pub remind_at: DateTime<Utc>,
    pub sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub id: i64,
    pub task_id: Option<i64>,
    pub task_title: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub note: String,
}

/// SQLite database for the task tracker.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/pomotask.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened,
    /// or migrations fail.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("pomotask.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Statements are atomic in SQLite; a poisoned guard still holds a usable connection.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Insert a task. A due timestamp also creates its reminder.
    ///
    /// # Errors
    /// Returns a validation error for a blank title, or a database error.
    pub fn add_task(
        &self,
        title: &str,
        description: &str,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<i64, CoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "title".into(),
                message: "task title is required".into(),
            }
            .into());
        }

        let now = to_sql_ts(Utc::now());
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO tasks (title, description, due_at, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![title, description.trim(), due_at.map(to_sql_ts), now],
        )?;
        let task_id = tx.last_insert_rowid();
        if let Some(due) = due_at {
            replace_unsent_reminder(&tx, task_id, due)?;
        }
        tx.commit()?;
        Ok(task_id)
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>, DatabaseError> {
        let conn = self.conn();
        let task = conn
            .query_row(
                "SELECT id, title, description, due_at, completed, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                params![id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    /// Tasks with a due date first (soonest first), then undated ones newest first.
    pub fn list_tasks(&self, limit: usize) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, due_at, completed, created_at, updated_at
             FROM tasks
             ORDER BY due_at IS NULL, due_at ASC, created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], task_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Set or clear a task's due timestamp, keeping its unsent reminder in step.
    pub fn set_task_due(
        &self,
        task_id: i64,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE tasks SET due_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![due_at.map(to_sql_ts), to_sql_ts(Utc::now()), task_id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "task", id: task_id });
        }
        match due_at {
            Some(due) => {
                replace_unsent_reminder(&tx, task_id, due)?;
            }
            None => {
                tx.execute(
                    "DELETE FROM reminders WHERE task_id = ?1 AND sent = 0",
                    params![task_id],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn complete_task(&self, task_id: i64) -> Result<(), DatabaseError> {
        let changed = self.conn().execute(
            "UPDATE tasks SET completed = 1, updated_at = ?1 WHERE id = ?2",
            params![to_sql_ts(Utc::now()), task_id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "task", id: task_id });
        }
        Ok(())
    }

    /// Delete a task. Its reminders go with it; its session logs keep their
    /// rows with the task reference cleared.
    pub fn delete_task(&self, task_id: i64) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        Ok(changed > 0)
    }

    pub fn count_open_tasks(&self) -> Result<u64, DatabaseError> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM tasks WHERE completed = 0",
            [],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }

    /// Open tasks due on the UTC calendar day containing `now`.
    pub fn count_due_today(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let (start, end) = day_bounds(now);
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE completed = 0 AND due_at >= ?1 AND due_at < ?2",
            params![start, end],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }

    // ── Reminders ────────────────────────────────────────────────────

    pub fn list_reminders(&self, include_sent: bool) -> Result<Vec<Reminder>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, remind_at, sent FROM reminders
             WHERE sent = 0 OR ?1
             ORDER BY remind_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![include_sent], |row| {
            Ok(Reminder {
                id: row.get(0)?,
                task_id: row.get(1)?,
                remind_at: ts_column(row, 2)?,
                sent: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Most recent session logs first, joined with task titles.
    pub fn list_recent_sessions(&self, limit: usize) -> Result<Vec<SessionLogEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.task_id, t.title, s.started_at, s.ended_at,
                    s.duration_minutes, s.notes
             FROM pomodoro_sessions s
             LEFT JOIN tasks t ON s.task_id = t.id
             ORDER BY s.started_at DESC, s.id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SessionLogEntry {
                id: row.get(0)?,
                task_id: row.get(1)?,
                task_title: row.get(2)?,
                started_at: ts_column(row, 3)?,
                ended_at: ts_column(row, 4)?,
                duration_minutes: row.get(5)?,
                note: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Sessions started on the UTC calendar day containing `now`.
    pub fn count_sessions_today(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let (start, end) = day_bounds(now);
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM pomodoro_sessions WHERE started_at >= ?1 AND started_at < ?2",
            params![start, end],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }
}

impl ReminderStore for Database {
    fn insert_or_replace_unsent_reminder(
        &self,
        task_id: i64,
        remind_at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let exists = tx
            .query_row("SELECT 1 FROM tasks WHERE id = ?1", params![task_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(DatabaseError::NotFound { entity: "task", id: task_id });
        }
        let id = replace_unsent_reminder(&tx, task_id, remind_at)?;
        tx.commit()?;
        Ok(id)
    }

    fn fetch_due_unsent_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueReminder>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.task_id, r.remind_at, t.title
             FROM reminders r
             LEFT JOIN tasks t ON r.task_id = t.id
             WHERE r.sent = 0 AND r.remind_at <= ?1
             ORDER BY r.remind_at ASC, r.id ASC",
        )?;
        let rows = stmt.query_map(params![to_sql_ts(now)], |row| {
            Ok(DueReminder {
                id: row.get(0)?,
                task_id: row.get(1)?,
                remind_at: ts_column(row, 2)?,
                task_title: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn mark_reminder_sent(&self, id: i64) -> Result<bool, DatabaseError> {
        let changed = self.conn().execute(
            "UPDATE reminders SET sent = 1 WHERE id = ?1 AND sent = 0",
            params![id],
        )?;
        Ok(changed == 1)
    }
}

impl SessionStore for Database {
    fn append_session_log(&self, entry: &NewSessionLog) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO pomodoro_sessions
                 (task_id, started_at, ended_at, duration_minutes, notes, created_at)
             VALUES ((SELECT id FROM tasks WHERE id = ?1), ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.task_id,
                to_sql_ts(entry.started_at),
                to_sql_ts(entry.ended_at),
                entry.duration_minutes.max(1),
                entry.note,
                to_sql_ts(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

fn replace_unsent_reminder(
    conn: &Connection,
    task_id: i64,
    remind_at: DateTime<Utc>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "DELETE FROM reminders WHERE task_id = ?1 AND sent = 0",
        params![task_id],
    )?;
    conn.execute(
        "INSERT INTO reminders (task_id, remind_at, sent, created_at) VALUES (?1, ?2, 0, ?3)",
        params![task_id, to_sql_ts(remind_at), to_sql_ts(Utc::now())],
    )?;
    Ok(conn.last_insert_rowid())
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        due_at: opt_ts_column(row, 3)?,
        completed: row.get(4)?,
        created_at: ts_column(row, 5)?,
        updated_at: ts_column(row, 6)?,
    })
}

fn day_bounds(now: DateTime<Utc>) -> (String, String) {
    let start = now.duration_trunc(chrono::Duration::days(1)).unwrap_or(now);
    let end = start + chrono::Duration::days(1);
    (to_sql_ts(start), to_sql_ts(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    #[test]
    fn add_task_with_due_creates_reminder() {
        let db = Database::open_memory().unwrap();
        let id = db.add_task("Write report", "", Some(at(9, 0))).unwrap();

        let reminders = db.list_reminders(false).unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].task_id, Some(id));
        assert_eq!(reminders[0].remind_at, at(9, 0));
        assert!(!reminders[0].sent);
    }

    #[test]
    fn add_task_rejects_blank_title() {
        let db = Database::open_memory().unwrap();
        let err = db.add_task("   ", "", None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn setting_due_twice_leaves_one_unsent_reminder() {
        let db = Database::open_memory().unwrap();
        let id = db.add_task("Call dentist", "", Some(at(9, 0))).unwrap();
        db.set_task_due(id, Some(at(10, 30))).unwrap();
        db.insert_or_replace_unsent_reminder(id, at(11, 0)).unwrap();

        let reminders = db.list_reminders(false).unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].remind_at, at(11, 0));
        assert_eq!(db.get_task(id).unwrap().unwrap().due_at, Some(at(10, 30)));
    }

    #[test]
    fn clearing_due_drops_unsent_reminder_but_keeps_sent_history() {
        let db = Database::open_memory().unwrap();
        let id = db.add_task("Standup", "", Some(at(9, 0))).unwrap();
        let first = db.list_reminders(false).unwrap()[0].id;
        assert!(db.mark_reminder_sent(first).unwrap());
        db.set_task_due(id, Some(at(12, 0))).unwrap();
        db.set_task_due(id, None).unwrap();

        assert!(db.list_reminders(false).unwrap().is_empty());
        let all = db.list_reminders(true).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].sent);
    }

    #[test]
    fn set_due_on_missing_task_is_not_found() {
        let db = Database::open_memory().unwrap();
        let err = db.set_task_due(99, Some(at(9, 0))).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { id: 99, .. }));
        assert!(matches!(
            db.insert_or_replace_unsent_reminder(99, at(9, 0)),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn due_lookup_is_ordered_and_excludes_future_and_sent() {
        let db = Database::open_memory().unwrap();
        let late = db.add_task("late", "", Some(at(8, 30))).unwrap();
        let early = db.add_task("early", "", Some(at(8, 0))).unwrap();
        db.add_task("future", "", Some(at(12, 0))).unwrap();

        let due = db.fetch_due_unsent_reminders(at(9, 0)).unwrap();
        let tasks: Vec<_> = due.iter().map(|r| r.task_id).collect();
        assert_eq!(tasks, vec![Some(early), Some(late)]);
        assert_eq!(due[0].task_title.as_deref(), Some("early"));

        assert!(db.mark_reminder_sent(due[0].id).unwrap());
        assert!(!db.mark_reminder_sent(due[0].id).unwrap());
        let due = db.fetch_due_unsent_reminders(at(9, 0)).unwrap();
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn reminder_due_exactly_now_is_included() {
        let db = Database::open_memory().unwrap();
        db.add_task("edge", "", Some(at(9, 0))).unwrap();
        assert_eq!(db.fetch_due_unsent_reminders(at(9, 0)).unwrap().len(), 1);
        let just_before = at(9, 0) - ChronoDuration::seconds(1);
        assert!(db.fetch_due_unsent_reminders(just_before).unwrap().is_empty());
    }

    #[test]
    fn deleting_task_cascades_reminders_and_nulls_sessions() {
        let db = Database::open_memory().unwrap();
        let id = db.add_task("Temp", "", Some(at(9, 0))).unwrap();
        db.append_session_log(&NewSessionLog {
            task_id: Some(id),
            started_at: at(9, 0),
            ended_at: at(9, 25),
            duration_minutes: 25,
            note: "focus completed".into(),
        })
        .unwrap();

        assert!(db.delete_task(id).unwrap());
        assert!(db.list_reminders(true).unwrap().is_empty());

        let sessions = db.list_recent_sessions(10).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].task_id, None);
        assert_eq!(sessions[0].task_title, None);
    }

    #[test]
    fn session_log_with_dangling_task_is_stored_unbound() {
        let db = Database::open_memory().unwrap();
        db.append_session_log(&NewSessionLog {
            task_id: Some(42),
            started_at: at(10, 0),
            ended_at: at(10, 5),
            duration_minutes: 5,
            note: "short_break completed".into(),
        })
        .unwrap();

        let sessions = db.list_recent_sessions(10).unwrap();
        assert_eq!(sessions[0].task_id, None);
        assert_eq!(sessions[0].duration_minutes, 5);
        assert_eq!(sessions[0].started_at, at(10, 0));
    }

    #[test]
    fn dashboard_counts() {
        let db = Database::open_memory().unwrap();
        let a = db.add_task("a", "", Some(at(17, 0))).unwrap();
        db.add_task("b", "", Some(at(8, 0) + ChronoDuration::days(1))).unwrap();
        db.add_task("c", "", None).unwrap();
        db.complete_task(a).unwrap();

        assert_eq!(db.count_open_tasks().unwrap(), 2);
        assert_eq!(db.count_due_today(at(12, 0)).unwrap(), 0);
        assert_eq!(db.count_due_today(at(12, 0) + ChronoDuration::days(1)).unwrap(), 1);

        db.append_session_log(&NewSessionLog {
            task_id: None,
            started_at: at(7, 0),
            ended_at: at(7, 25),
            duration_minutes: 25,
            note: String::new(),
        })
        .unwrap();
        assert_eq!(db.count_sessions_today(at(23, 0)).unwrap(), 1);
    }

    #[test]
    fn list_tasks_puts_undated_last() {
        let db = Database::open_memory().unwrap();
        db.add_task("undated", "", None).unwrap();
        db.add_task("later", "", Some(at(15, 0))).unwrap();
        db.add_task("sooner", "", Some(at(9, 0))).unwrap();

        let titles: Vec<_> = db
            .list_tasks(10)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["sooner", "later", "undated"]);
    }
}
