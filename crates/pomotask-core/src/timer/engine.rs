//! Focus/break interval state machine.
//!
//! The engine has no thread and no clock of its own. Every operation takes
//! `now` and returns the [`Event`] describing what changed; the caller is
//! responsible for calling `tick()` once per second and for acting on the
//! returned events (logging intervals, notifying).
//!
//! ## Cycle
//!
//! ```text
//! Focus -> ShortBreak -> Focus -> ... -> Focus -> LongBreak -> Focus
//!                        (every `long_break_interval` focus completions)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::events::Event;
use crate::storage::NewSessionLog;

/// Abandoned intervals shorter than this are dropped instead of logged.
pub const MIN_LOGGED_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    Focus,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub const ALL: [TimerMode; 3] = [TimerMode::Focus, TimerMode::ShortBreak, TimerMode::LongBreak];

    pub fn as_str(self) -> &'static str {
        match self {
            TimerMode::Focus => "focus",
            TimerMode::ShortBreak => "short_break",
            TimerMode::LongBreak => "long_break",
        }
    }

    /// Human-readable name, e.g. "Short Break".
    pub fn label(self) -> &'static str {
        match self {
            TimerMode::Focus => "Focus",
            TimerMode::ShortBreak => "Short Break",
            TimerMode::LongBreak => "Long Break",
        }
    }

    /// Notification announcing that an interval in this mode has begun.
    pub fn transition_notice(self) -> (&'static str, &'static str) {
        match self {
            TimerMode::Focus => ("Focus time", "Back to work. You got this!"),
            TimerMode::ShortBreak => ("Short break time!", "Breathe. Hydrate. Stretch."),
            TimerMode::LongBreak => ("Long break time!", "Great job. Take a longer rest."),
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "focus" => Ok(TimerMode::Focus),
            "short_break" => Ok(TimerMode::ShortBreak),
            "long_break" => Ok(TimerMode::LongBreak),
            other => Err(ValidationError::InvalidValue {
                field: "mode".into(),
                message: format!("unknown timer mode '{other}'"),
            }),
        }
    }
}

/// Interval lengths and long-break cadence. Every field is at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    /// Focus completions per long break.
    pub long_break_interval: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            focus_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_interval: 4,
        }
    }
}

impl TimerConfig {
    /// Build a config, clamping every value to at least 1.
    pub fn new(focus: u32, short_break: u32, long_break: u32, long_break_interval: u32) -> Self {
        Self {
            focus_minutes: focus.max(1),
            short_break_minutes: short_break.max(1),
            long_break_minutes: long_break.max(1),
            long_break_interval: long_break_interval.max(1),
        }
    }

    /// Same as [`new`](Self::new) for untrusted signed input.
    pub fn clamped(focus: i64, short_break: i64, long_break: i64, long_break_interval: i64) -> Self {
        let clamp = |v: i64| v.clamp(1, i64::from(u32::MAX)) as u32;
        Self::new(
            clamp(focus),
            clamp(short_break),
            clamp(long_break),
            clamp(long_break_interval),
        )
    }

    pub fn minutes_for(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Focus => self.focus_minutes,
            TimerMode::ShortBreak => self.short_break_minutes,
            TimerMode::LongBreak => self.long_break_minutes,
        }
    }

    /// Full countdown for `mode`, never below one second.
    pub fn duration_secs(&self, mode: TimerMode) -> u32 {
        self.minutes_for(mode).saturating_mul(60).max(1)
    }

    fn normalized(self) -> Self {
        Self::new(
            self.focus_minutes,
            self.short_break_minutes,
            self.long_break_minutes,
            self.long_break_interval,
        )
    }
}

/// Read-only view of the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub mode: TimerMode,
    pub time_left_secs: u32,
    /// Focus completions counted for the long-break cadence.
    pub completed_focus_cycles_in_set: u32,
    pub total_focus_completed: u32,
    pub running: bool,
    pub bound_task_id: Option<i64>,
    /// Set while an interval is open; cleared when it is logged or discarded.
    pub interval_started_at: Option<DateTime<Utc>>,
}

impl TimerState {
    fn initial(config: &TimerConfig) -> Self {
        Self {
            mode: TimerMode::Focus,
            time_left_secs: config.duration_secs(TimerMode::Focus),
            completed_focus_cycles_in_set: 0,
            total_focus_completed: 0,
            running: false,
            bound_task_id: None,
            interval_started_at: None,
        }
    }
}

/// What `start` does with the bound task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskBinding {
    Keep,
    Bind(i64),
    Clear,
}

impl TaskBinding {
    /// `None` keeps the current binding. Anything that is not a positive
    /// integer clears it.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => TaskBinding::Keep,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(id) if id > 0 => TaskBinding::Bind(id),
                _ => TaskBinding::Clear,
            },
        }
    }
}

/// An interval that ended and should be written to the session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedInterval {
    pub mode: TimerMode,
    pub task_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: u32,
}

impl CompletedInterval {
    pub fn note(&self) -> String {
        format!("{} completed", self.mode)
    }

    pub fn to_session_log(&self) -> NewSessionLog {
        NewSessionLog {
            task_id: self.task_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_minutes: self.duration_minutes,
            note: self.note(),
        }
    }
}

/// Core interval timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalTimer {
    config: TimerConfig,
    state: TimerState,
}

impl Default for IntervalTimer {
    fn default() -> Self {
        Self::new(TimerConfig::default())
    }
}

impl IntervalTimer {
    /// Idle in focus mode with the full focus duration loaded.
    pub fn new(config: TimerConfig) -> Self {
        let config = config.normalized();
        Self {
            state: TimerState::initial(&config),
            config,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> TimerConfig {
        self.config
    }

    pub fn snapshot(&self) -> TimerState {
        self.state.clone()
    }

    pub fn time_left_secs(&self) -> u32 {
        self.state.time_left_secs
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Start or resume. Opens an interval at `now` if none is open.
    /// Returns `None` if already running.
    pub fn start(&mut self, now: DateTime<Utc>, binding: TaskBinding) -> Option<Event> {
        if self.state.running {
            return None;
        }
        self.state.running = true;
        if self.state.interval_started_at.is_none() {
            self.state.interval_started_at = Some(now);
        }
        match binding {
            TaskBinding::Keep => {}
            TaskBinding::Bind(id) => self.state.bound_task_id = Some(id),
            TaskBinding::Clear => self.state.bound_task_id = None,
        }
        Some(Event::TimerStarted {
            mode: self.state.mode,
            time_left_secs: self.state.time_left_secs,
            task_id: self.state.bound_task_id,
            at: now,
        })
    }

    /// Pause without touching the countdown or the open interval.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if !self.state.running {
            return None;
        }
        self.state.running = false;
        Some(Event::TimerPaused {
            mode: self.state.mode,
            time_left_secs: self.state.time_left_secs,
            at: now,
        })
    }

    /// Advance one second. Returns an event only when the countdown reaches
    /// zero and the next interval begins.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if !self.state.running || self.state.time_left_secs == 0 {
            return None;
        }
        self.state.time_left_secs -= 1;
        if self.state.time_left_secs > 0 {
            return None;
        }
        Some(self.advance(now))
    }

    /// Stop and reload the full duration of the current mode.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Event {
        self.state.running = false;
        let interval = self.close_interval(now, false);
        self.state.time_left_secs = self.config.duration_secs(self.state.mode);
        Event::TimerReset {
            mode: self.state.mode,
            time_left_secs: self.state.time_left_secs,
            interval,
            at: now,
        }
    }

    /// Manual override: stop and load `mode` with its full duration.
    pub fn switch_mode(&mut self, now: DateTime<Utc>, mode: TimerMode) -> Event {
        self.state.running = false;
        let interval = self.close_interval(now, false);
        let from = self.state.mode;
        self.state.mode = mode;
        self.state.time_left_secs = self.config.duration_secs(mode);
        Event::ModeSwitched {
            from,
            to: mode,
            time_left_secs: self.state.time_left_secs,
            interval,
            at: now,
        }
    }

    /// Replace the config. A running countdown keeps its remaining time.
    pub fn apply_config(&mut self, now: DateTime<Utc>, config: TimerConfig) -> Event {
        self.config = config.normalized();
        if !self.state.running {
            self.state.time_left_secs = self.config.duration_secs(self.state.mode);
        }
        Event::ConfigApplied {
            config: self.config,
            time_left_secs: self.state.time_left_secs,
            at: now,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn advance(&mut self, now: DateTime<Utc>) -> Event {
        let from = self.state.mode;
        let interval = self.close_interval(now, true);
        let to = match from {
            TimerMode::Focus => {
                self.state.total_focus_completed += 1;
                self.state.completed_focus_cycles_in_set += 1;
                if self.state.completed_focus_cycles_in_set % self.config.long_break_interval == 0 {
                    TimerMode::LongBreak
                } else {
                    TimerMode::ShortBreak
                }
            }
            TimerMode::ShortBreak | TimerMode::LongBreak => TimerMode::Focus,
        };
        self.state.mode = to;
        self.state.time_left_secs = self.config.duration_secs(to);
        self.state.interval_started_at = Some(now);
        Event::IntervalCompleted {
            from,
            to,
            time_left_secs: self.state.time_left_secs,
            interval,
            at: now,
        }
    }

    /// Close the open interval. Abandoned intervals under a minute are
    /// dropped; natural completions are always kept.
    fn close_interval(&mut self, now: DateTime<Utc>, natural: bool) -> Option<CompletedInterval> {
        let started_at = self.state.interval_started_at.take()?;
        let elapsed = (now - started_at).num_seconds().max(0);
        if !natural && elapsed < MIN_LOGGED_SECS {
            return None;
        }
        let minutes = u32::try_from(elapsed / 60).unwrap_or(u32::MAX).max(1);
        Some(CompletedInterval {
            mode: self.state.mode,
            task_id: self.state.bound_task_id,
            started_at,
            ended_at: now,
            duration_minutes: minutes,
        })
    }
}

/// Format seconds as `MM:SS`. Minutes are not wrapped at 60.
pub fn format_time_left(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
