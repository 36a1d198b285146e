pub mod config;
pub mod reminder;
pub mod run;
pub mod session;
pub mod stats;
pub mod task;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Accepts RFC 3339, or `YYYY-MM-DD HH:MM` in local time.
pub fn parse_due(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .map_err(|_| format!("invalid due time '{raw}' (expected RFC 3339 or 'YYYY-MM-DD HH:MM')"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| format!("due time '{raw}' does not exist in the local time zone"))
}

pub fn display_ts(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
