//! The store boundary consumed by the two engines.
//!
//! [`Database`](super::Database) is the production implementation; the
//! traits exist so the scheduler and timer can be exercised against
//! failing or recording stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// A due, unsent reminder joined with its task title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueReminder {
    pub id: i64,
    pub task_id: Option<i64>,
    pub remind_at: DateTime<Utc>,
    /// `None` when the task no longer exists.
    pub task_title: Option<String>,
}

/// A session log row to append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSessionLog {
    pub task_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub note: String,
}

pub trait ReminderStore: Send + Sync {
    /// Set the single unsent reminder for `task_id`, replacing any existing one.
    fn insert_or_replace_unsent_reminder(
        &self,
        task_id: i64,
        remind_at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError>;

    /// Unsent reminders with `remind_at <= now`, oldest first.
    fn fetch_due_unsent_reminders(&self, now: DateTime<Utc>)
        -> Result<Vec<DueReminder>, DatabaseError>;

    /// Flip `sent` for an unsent reminder. Returns `false` if it was already
    /// sent or does not exist.
    fn mark_reminder_sent(&self, id: i64) -> Result<bool, DatabaseError>;
}

pub trait SessionStore: Send + Sync {
    /// Append a finished interval. A `task_id` that no longer resolves is
    /// stored as `NULL`.
    fn append_session_log(&self, entry: &NewSessionLog) -> Result<i64, DatabaseError>;
}
