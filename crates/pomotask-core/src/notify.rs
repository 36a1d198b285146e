//! Notification side-effect boundary.
//!
//! Engines call [`Notifier::notify`] and treat the result as advisory: a
//! failure is logged by the caller and never interrupts a loop.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: Option<&str>) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. The default transport for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: Option<&str>) -> Result<(), NotifyError> {
        match body {
            Some(body) => tracing::info!(target: "pomotask::notify", "{title}: {body}"),
            None => tracing::info!(target: "pomotask::notify", "{title}"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: Option<String>,
    pub at: DateTime<Utc>,
}

/// Keeps notifications in memory until a host drains them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    inbox: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything received so far, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.lock())
    }

    pub fn titles(&self) -> Vec<String> {
        self.lock().iter().map(|n| n.title.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        self.inbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: Option<&str>) -> Result<(), NotifyError> {
        self.lock().push(Notification {
            title: title.to_string(),
            body: body.map(str::to_string),
            at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_drains_in_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify("first", None).unwrap();
        notifier.notify("second", Some("body")).unwrap();
        assert_eq!(notifier.len(), 2);

        let drained = notifier.drain();
        assert_eq!(drained[0].title, "first");
        assert_eq!(drained[1].body.as_deref(), Some("body"));
        assert!(notifier.is_empty());
    }

    #[test]
    fn log_notifier_never_fails() {
        assert!(LogNotifier.notify("Reminder Due", Some("Task: x")).is_ok());
    }
}
