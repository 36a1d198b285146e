mod config;
pub mod database;
pub mod migrations;
mod store;

pub use config::{Config, SchedulerSection, TimerSection};
pub use database::{Database, Reminder, SessionLogEntry, Task};
pub use store::{DueReminder, NewSessionLog, ReminderStore, SessionStore};

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};

/// Returns the data directory, creating it if needed.
///
/// `POMOTASK_DATA_DIR` wins when set. Otherwise `~/.config/pomotask[-dev]/`
/// based on `POMOTASK_ENV` (set `POMOTASK_ENV=dev` for a development copy).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("POMOTASK_DATA_DIR") {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("POMOTASK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("pomotask-dev")
            } else {
                base_dir.join("pomotask")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Timestamps are stored as second-precision RFC 3339 in UTC so that text
/// comparison in SQL matches chronological order.
pub(crate) fn to_sql_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn ts_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn opt_ts_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => ts_column(row, idx).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sql_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(to_sql_ts(early) < to_sql_ts(late));
        assert_eq!(to_sql_ts(late), "2026-01-10T00:00:00Z");
    }
}
