//! Host-facing timer: one [`IntervalTimer`] per user session.
//!
//! Host commands and the optional 1 Hz driver both go through the session
//! mutex, so the timer is never mutated from two threads at once. Events are
//! applied (session log, notification) after the lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::engine::{IntervalTimer, TaskBinding, TimerConfig, TimerMode, TimerState};
use crate::background::BackgroundTask;
use crate::events::Event;
use crate::notify::Notifier;
use crate::storage::SessionStore;

const TICK: Duration = Duration::from_secs(1);
const DRIVER_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Source of "now" for a session. Tests substitute a manual clock.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct Inner {
    timer: Mutex<IntervalTimer>,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    clock: Clock,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, IntervalTimer> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` under the session lock, then apply the event it produced.
    fn apply<F>(&self, op: F) -> Option<Event>
    where
        F: FnOnce(&mut IntervalTimer, DateTime<Utc>) -> Option<Event>,
    {
        let event = {
            let mut timer = self.lock();
            op(&mut timer, (self.clock)())
        };
        if let Some(event) = &event {
            self.dispatch(event);
        }
        event
    }

    fn dispatch(&self, event: &Event) {
        if let Some(interval) = event.logged_interval() {
            match self.store.append_session_log(&interval.to_session_log()) {
                Ok(id) => tracing::debug!(
                    session_id = id,
                    mode = %interval.mode,
                    minutes = interval.duration_minutes,
                    "interval logged"
                ),
                Err(e) => tracing::warn!(error = %e, mode = %interval.mode, "failed to log interval"),
            }
        }
        if let Some((title, body)) = event.notification() {
            if let Err(e) = self.notifier.notify(title, Some(body)) {
                tracing::warn!(error = %e, title, "timer notification failed");
            }
        }
    }
}

pub struct TimerSession {
    inner: Arc<Inner>,
    driver: tokio::sync::Mutex<Option<BackgroundTask>>,
}

impl TimerSession {
    pub fn new(
        config: TimerConfig,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_clock(config, store, notifier, Arc::new(Utc::now))
    }

    pub fn with_clock(
        config: TimerConfig,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        clock: Clock,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                timer: Mutex::new(IntervalTimer::new(config)),
                store,
                notifier,
                clock,
            }),
            driver: tokio::sync::Mutex::new(None),
        }
    }

    /// Start or resume. `task_id` that is not a positive integer clears the
    /// bound task; `None` keeps it.
    pub fn start(&self, task_id: Option<&str>) -> Option<Event> {
        let binding = TaskBinding::parse(task_id);
        self.inner.apply(|timer, now| timer.start(now, binding))
    }

    pub fn pause(&self) -> Option<Event> {
        self.inner.apply(|timer, now| timer.pause(now))
    }

    pub fn reset(&self) -> Option<Event> {
        self.inner.apply(|timer, now| Some(timer.reset(now)))
    }

    /// Unrecognized modes are ignored.
    pub fn switch_mode(&self, mode: &str) -> Option<Event> {
        let Ok(mode) = mode.parse::<TimerMode>() else {
            tracing::debug!(mode, "ignoring unknown timer mode");
            return None;
        };
        self.inner.apply(|timer, now| Some(timer.switch_mode(now, mode)))
    }

    pub fn apply_config(&self, focus: i64, short_break: i64, long_break: i64, interval: i64) -> Option<Event> {
        let config = TimerConfig::clamped(focus, short_break, long_break, interval);
        let event = self.inner.apply(|timer, now| Some(timer.apply_config(now, config)));
        tracing::info!(?config, "timer config applied");
        event
    }

    pub fn tick(&self) -> Option<Event> {
        self.inner.apply(|timer, now| timer.tick(now))
    }

    pub fn snapshot(&self) -> TimerState {
        self.inner.lock().snapshot()
    }

    pub fn config(&self) -> TimerConfig {
        self.inner.lock().config()
    }

    // ── Driver ───────────────────────────────────────────────────────

    /// Spawn the 1 Hz ticker on the current tokio runtime. Returns `false`
    /// if a driver is already alive.
    pub async fn start_driver(&self) -> bool {
        let mut driver = self.driver.lock().await;
        if driver.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        *driver = Some(BackgroundTask::spawn("timer-driver", move |cancel| {
            drive(inner, cancel)
        }));
        tracing::info!("timer driver started");
        true
    }

    /// Stop the ticker, waiting up to 3 s. Returns `false` if a tick is still
    /// in flight, in which case the driver is kept until a later call sees it
    /// exit.
    pub async fn stop_driver(&self) -> bool {
        let mut driver = self.driver.lock().await;
        let Some(task) = driver.as_mut() else {
            return true;
        };
        if !task.shutdown(DRIVER_STOP_TIMEOUT).await {
            return false;
        }
        *driver = None;
        tracing::info!("timer driver stopped");
        true
    }

    pub async fn driver_running(&self) -> bool {
        self.driver
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TimerSession {
    fn drop(&mut self) {
        if let Some(task) = self.driver.get_mut() {
            task.cancel();
        }
    }
}

/// Missed ticks are dropped rather than replayed in a burst.
async fn drive(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut ticks = tokio::time::interval_at(Instant::now() + TICK, TICK);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }
        let inner = Arc::clone(&inner);
        let tick = tokio::task::spawn_blocking(move || inner.apply(|timer, now| timer.tick(now)));
        if let Err(e) = tick.await {
            tracing::error!(error = %e, "timer tick panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseError, NotifyError};
    use crate::notify::RecordingNotifier;
    use crate::storage::NewSessionLog;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::thread;
    use std::time::Instant as StdInstant;

    #[derive(Default)]
    struct MemoryLog {
        rows: Mutex<Vec<NewSessionLog>>,
    }

    impl MemoryLog {
        fn rows(&self) -> Vec<NewSessionLog> {
            self.rows.lock().unwrap().clone()
        }
    }

    impl SessionStore for MemoryLog {
        fn append_session_log(&self, entry: &NewSessionLog) -> Result<i64, DatabaseError> {
            let mut rows = self.rows.lock().unwrap();
            rows.push(entry.clone());
            Ok(rows.len() as i64)
        }
    }

    struct BrokenLog;

    impl SessionStore for BrokenLog {
        fn append_session_log(&self, _: &NewSessionLog) -> Result<i64, DatabaseError> {
            Err(DatabaseError::Locked)
        }
    }

    struct BrokenNotifier;

    impl Notifier for BrokenNotifier {
        fn notify(&self, title: &str, _: Option<&str>) -> Result<(), NotifyError> {
            Err(NotifyError {
                title: title.to_string(),
                message: "no display".into(),
            })
        }
    }

    /// Manual clock advanced by tests, in seconds from a fixed origin.
    struct ManualClock(Arc<AtomicI64>);

    impl ManualClock {
        fn new() -> (Self, Clock) {
            let secs = Arc::new(AtomicI64::new(0));
            let origin = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
            let reader = Arc::clone(&secs);
            let clock: Clock =
                Arc::new(move || origin + chrono::Duration::seconds(reader.load(Ordering::SeqCst)));
            (Self(secs), clock)
        }

        fn advance(&self, secs: i64) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    fn session(
        config: TimerConfig,
    ) -> (TimerSession, Arc<MemoryLog>, Arc<RecordingNotifier>, ManualClock) {
        let log = Arc::new(MemoryLog::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let (manual, clock) = ManualClock::new();
        let session = TimerSession::with_clock(config, log.clone(), notifier.clone(), clock);
        (session, log, notifier, manual)
    }

    fn tick_for(session: &TimerSession, clock: &ManualClock, secs: u32) {
        for _ in 0..secs {
            clock.advance(1);
            session.tick();
        }
    }

    #[test]
    fn reset_after_thirty_seconds_logs_nothing() {
        let (session, log, _, clock) = session(TimerConfig::default());
        session.start(None);
        tick_for(&session, &clock, 30);
        session.reset();
        assert!(log.rows().is_empty());
        assert_eq!(session.snapshot().time_left_secs, 25 * 60);
    }

    #[test]
    fn reset_after_sixty_one_seconds_logs_one_minute() {
        let (session, log, notifier, clock) = session(TimerConfig::default());
        session.start(Some("4"));
        tick_for(&session, &clock, 61);
        session.reset();

        let rows = log.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].duration_minutes, 1);
        assert_eq!(rows[0].task_id, Some(4));
        assert_eq!(rows[0].note, "focus completed");
        // Manual actions never notify.
        assert!(notifier.is_empty());
    }

    #[test]
    fn natural_transitions_log_and_notify() {
        let (session, log, notifier, clock) = session(TimerConfig::new(1, 1, 1, 2));
        session.start(None);
        tick_for(&session, &clock, 60 * 4);

        assert_eq!(
            notifier.titles(),
            vec!["Short break time!", "Focus time", "Long break time!", "Focus time"]
        );
        let notes: Vec<_> = log.rows().into_iter().map(|r| r.note).collect();
        assert_eq!(
            notes,
            vec![
                "focus completed",
                "short_break completed",
                "focus completed",
                "long_break completed"
            ]
        );
        assert!(session.snapshot().running);
    }

    #[test]
    fn invalid_task_id_clears_binding() {
        let (session, _, _, _) = session(TimerConfig::default());
        session.start(Some("12"));
        assert_eq!(session.snapshot().bound_task_id, Some(12));
        session.pause();
        session.start(Some("twelve"));
        assert_eq!(session.snapshot().bound_task_id, None);
        assert!(session.snapshot().running);
    }

    #[test]
    fn unknown_mode_is_noop() {
        let (session, _, _, _) = session(TimerConfig::default());
        session.start(None);
        assert!(session.switch_mode("siesta").is_none());
        let state = session.snapshot();
        assert!(state.running);
        assert_eq!(state.mode, TimerMode::Focus);

        assert!(session.switch_mode("short_break").is_some());
        assert_eq!(session.snapshot().mode, TimerMode::ShortBreak);
        assert_eq!(session.snapshot().time_left_secs, 5 * 60);
    }

    #[test]
    fn apply_config_clamps_and_respects_running() {
        let (session, _, _, clock) = session(TimerConfig::default());
        session.apply_config(0, -1, 0, 0);
        assert_eq!(session.config(), TimerConfig::new(1, 1, 1, 1));
        assert_eq!(session.snapshot().time_left_secs, 60);

        session.apply_config(30, 5, 15, 4);
        assert_eq!(session.snapshot().time_left_secs, 30 * 60);

        session.start(None);
        tick_for(&session, &clock, 10);
        session.apply_config(45, 5, 15, 4);
        assert_eq!(session.snapshot().time_left_secs, 30 * 60 - 10);
    }

    #[test]
    fn side_effect_failures_are_swallowed() {
        let (_, clock) = ManualClock::new();
        let session = TimerSession::with_clock(
            TimerConfig::new(1, 1, 1, 4),
            Arc::new(BrokenLog),
            Arc::new(BrokenNotifier),
            clock,
        );
        session.start(None);
        for _ in 0..60 {
            session.tick();
        }
        assert_eq!(session.snapshot().mode, TimerMode::ShortBreak);
    }

    #[tokio::test]
    async fn driver_ticks_and_stops() {
        let log = Arc::new(MemoryLog::default());
        let session = TimerSession::new(
            TimerConfig::default(),
            log,
            Arc::new(RecordingNotifier::new()),
        );
        assert!(!session.driver_running().await);
        assert!(session.start_driver().await);
        assert!(!session.start_driver().await);
        assert!(session.driver_running().await);

        session.start(None);
        let deadline = StdInstant::now() + Duration::from_secs(10);
        while session.snapshot().time_left_secs == 25 * 60 && StdInstant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(session.snapshot().time_left_secs < 25 * 60);

        let started = StdInstant::now();
        assert!(session.stop_driver().await);
        assert!(started.elapsed() < DRIVER_STOP_TIMEOUT);
        assert!(!session.driver_running().await);
        assert!(session.stop_driver().await);

        assert!(session.start_driver().await);
        assert!(session.stop_driver().await);
    }

    #[test]
    fn driver_and_host_share_the_lock() {
        let (session, _, _, _) = session(TimerConfig::default());
        let session = Arc::new(session);
        session.start(None);

        let ticker = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                for _ in 0..500 {
                    session.tick();
                }
            })
        };
        for _ in 0..100 {
            session.pause();
            session.start(None);
        }
        ticker.join().unwrap();

        let left = session.snapshot().time_left_secs;
        assert!(left >= 25 * 60 - 500 && left <= 25 * 60);
    }
}
