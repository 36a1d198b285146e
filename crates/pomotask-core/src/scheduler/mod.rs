//! Reminder scheduler.
//!
//! One background task per scheduler object scans the store for due,
//! unsent reminders, notifies about each one (oldest first) and marks it
//! sent. "Sent" means processed: reminders are marked even while
//! notifications are disabled so a backlog does not replay later.
//!
//! ```text
//! start ──> [iteration] ──> sleep(poll, interruptible) ──> [iteration] ...
//!                 ^                    │ settings changed: re-read interval
//!                 └──── wake_now ──────┘ cancelled: exit
//! ```
//!
//! Scans run on tokio's blocking pool, since the store and the notifier are
//! synchronous.

mod settings;

pub use settings::{SchedulerSettings, MIN_POLL_INTERVAL_SECS};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::background::BackgroundTask;
use crate::error::CoreError;
use crate::notify::Notifier;
use crate::storage::{DueReminder, ReminderStore};

/// Notification title used for every due reminder.
pub const REMINDER_TITLE: &str = "Reminder Due";

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationReport {
    pub due: usize,
    pub notified: usize,
    pub marked: usize,
}

struct Shared {
    store: Arc<dyn ReminderStore>,
    notifier: Arc<dyn Notifier>,
    settings: watch::Sender<SchedulerSettings>,
    wake: Notify,
    /// Serializes scans so a reminder cannot be delivered twice.
    iteration: Mutex<()>,
}

/// Background reminder dispatcher. Construct once and share by reference.
///
/// [`start`](Self::start) and [`stop`](Self::stop) must be awaited on a
/// tokio runtime. [`run_iteration`](Self::run_iteration) needs none.
pub struct ReminderScheduler {
    shared: Arc<Shared>,
    lifecycle: tokio::sync::Mutex<Option<BackgroundTask>>,
    stop_timeout: Duration,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn ReminderStore>, notifier: Arc<dyn Notifier>) -> Self {
        let (settings, _) = watch::channel(SchedulerSettings::default());
        Self {
            shared: Arc::new(Shared {
                store,
                notifier,
                settings,
                wake: Notify::new(),
                iteration: Mutex::new(()),
            }),
            lifecycle: tokio::sync::Mutex::new(None),
            stop_timeout: STOP_TIMEOUT,
        }
    }

    /// How long [`stop`](Self::stop) waits for the loop. Defaults to 5 s.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Start the background loop, or reconfigure it if it is already running.
    ///
    /// The first scan happens immediately.
    ///
    /// # Errors
    /// [`CoreError::StillStopping`] if an earlier [`stop`](Self::stop) timed
    /// out and that loop has not exited yet.
    pub async fn start(&self, poll_interval_secs: u64, notifications_enabled: bool) -> Result<(), CoreError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Some(task) = lifecycle.as_ref() {
            if task.is_stopping() {
                warn!("refusing to start: previous reminder loop has not exited");
                return Err(CoreError::StillStopping("reminder scheduler"));
            }
            if !task.is_finished() {
                self.update_config(Some(poll_interval_secs), Some(notifications_enabled));
                return Ok(());
            }
        }

        self.shared.settings.send_replace(SchedulerSettings {
            poll_interval_secs,
            notifications_enabled,
        });
        let shared = Arc::clone(&self.shared);
        let settings = self.shared.settings.subscribe();
        *lifecycle = Some(BackgroundTask::spawn("reminder-scheduler", move |cancel| {
            run_loop(shared, settings, cancel)
        }));

        info!(
            poll_interval_secs,
            notifications_enabled, "reminder scheduler started"
        );
        Ok(())
    }

    /// Partially update the runtime settings. A sleeping loop re-reads the
    /// interval at once, measured from when its sleep began.
    pub fn update_config(&self, poll_interval_secs: Option<u64>, notifications_enabled: Option<bool>) {
        self.shared.settings.send_modify(|settings| {
            if let Some(secs) = poll_interval_secs {
                settings.poll_interval_secs = secs;
            }
            if let Some(enabled) = notifications_enabled {
                settings.notifications_enabled = enabled;
            }
        });
        let updated = self.settings();
        info!(
            poll_interval_secs = updated.poll_interval_secs,
            effective_secs = updated.effective_poll_interval().as_secs(),
            notifications_enabled = updated.notifications_enabled,
            "reminder scheduler config updated"
        );
    }

    /// Ask the loop to scan now instead of waiting out its interval. Called
    /// while idle, it makes the next sleep after `start` return at once.
    pub fn wake_now(&self) {
        self.shared.wake.notify_one();
    }

    /// Stop the loop, waiting up to the stop timeout for it to exit.
    ///
    /// Returns `false` if a scan is still in flight when the timeout
    /// expires. The loop is then kept, already cancelled, and `start` refuses
    /// until a later `stop` sees it exit. `true` when idle.
    pub async fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(task) = lifecycle.as_mut() else {
            return true;
        };
        if !task.shutdown(self.stop_timeout).await {
            return false;
        }
        *lifecycle = None;
        info!("reminder scheduler stopped");
        true
    }

    /// Whether a loop is alive, including one still finishing its last scan
    /// after a timed-out `stop`.
    pub async fn is_running(&self) -> bool {
        self.lifecycle
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn settings(&self) -> SchedulerSettings {
        *self.shared.settings.borrow()
    }

    pub fn effective_poll_interval(&self) -> Duration {
        self.settings().effective_poll_interval()
    }

    /// Run one scan synchronously against `now`.
    pub fn run_iteration(&self, now: DateTime<Utc>) -> Result<IterationReport, CoreError> {
        self.shared.run_iteration(now)
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.lifecycle.get_mut() {
            task.cancel();
        }
    }
}

impl Shared {
    fn run_iteration(&self, now: DateTime<Utc>) -> Result<IterationReport, CoreError> {
        let _scan = self.iteration.lock().unwrap_or_else(PoisonError::into_inner);

        let due = self.store.fetch_due_unsent_reminders(now)?;
        if due.is_empty() {
            debug!("no due reminders");
            return Ok(IterationReport::default());
        }
        let notify = self.settings.borrow().notifications_enabled;
        debug!(count = due.len(), notify, "found due reminders");

        let mut report = IterationReport {
            due: due.len(),
            ..IterationReport::default()
        };
        for reminder in &due {
            if notify {
                let body = reminder_body(reminder);
                match self.notifier.notify(REMINDER_TITLE, Some(&body)) {
                    Ok(()) => report.notified += 1,
                    Err(e) => warn!(reminder_id = reminder.id, error = %e, "reminder notification failed"),
                }
            }
            if self.store.mark_reminder_sent(reminder.id)? {
                report.marked += 1;
            }
        }
        Ok(report)
    }
}

/// `"Task: <title> at <time>"`, with `Untitled` for deleted tasks.
pub fn reminder_body(reminder: &DueReminder) -> String {
    let title = reminder
        .task_title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or("Untitled");
    format!(
        "Task: {title} at {}",
        reminder.remind_at.format("%Y-%m-%d %H:%M UTC")
    )
}

async fn run_loop(
    shared: Arc<Shared>,
    mut settings: watch::Receiver<SchedulerSettings>,
    cancel: CancellationToken,
) {
    info!("reminder scheduler loop started");
    loop {
        // Not raced against cancellation: a scan in flight always finishes.
        let scan = Arc::clone(&shared);
        match tokio::task::spawn_blocking(move || scan.run_iteration(Utc::now())).await {
            Ok(Ok(report)) if report.due > 0 => info!(
                due = report.due,
                notified = report.notified,
                marked = report.marked,
                "processed due reminders"
            ),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(error = %e, "reminder scheduler iteration failed"),
            Err(e) => error!(error = %e, "reminder scheduler iteration panicked"),
        }
        if !sleep_until_next_scan(&shared, &mut settings, &cancel).await {
            break;
        }
    }
    info!("reminder scheduler loop stopped");
}

/// Returns `false` when the loop should exit.
async fn sleep_until_next_scan(
    shared: &Shared,
    settings: &mut watch::Receiver<SchedulerSettings>,
    cancel: &CancellationToken,
) -> bool {
    let slept_from = Instant::now();
    loop {
        let deadline = slept_from + settings.borrow_and_update().effective_poll_interval();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            _ = shared.wake.notified() => return true,
            _ = tokio::time::sleep_until(deadline) => return true,
            changed = settings.changed() => {
                if changed.is_err() {
                    return false;
                }
                debug!("poll interval re-read");
            }
        }
    }
}
