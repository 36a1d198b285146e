use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{CompletedInterval, TimerConfig, TimerMode};

/// Every timer state change produces an Event.
/// The owning session turns them into session-log rows and notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        mode: TimerMode,
        time_left_secs: u32,
        task_id: Option<i64>,
        at: DateTime<Utc>,
    },
    TimerPaused {
        mode: TimerMode,
        time_left_secs: u32,
        at: DateTime<Utc>,
    },
    /// Countdown restored to the full duration of the current mode.
    TimerReset {
        mode: TimerMode,
        time_left_secs: u32,
        interval: Option<CompletedInterval>,
        at: DateTime<Utc>,
    },
    /// Manual mode change.
    ModeSwitched {
        from: TimerMode,
        to: TimerMode,
        time_left_secs: u32,
        interval: Option<CompletedInterval>,
        at: DateTime<Utc>,
    },
    /// Countdown hit zero and the next interval began.
    IntervalCompleted {
        from: TimerMode,
        to: TimerMode,
        time_left_secs: u32,
        interval: Option<CompletedInterval>,
        at: DateTime<Utc>,
    },
    ConfigApplied {
        config: TimerConfig,
        time_left_secs: u32,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// The interval this event closed, if it is long enough to keep.
    pub fn logged_interval(&self) -> Option<&CompletedInterval> {
        match self {
            Event::TimerReset { interval, .. }
            | Event::ModeSwitched { interval, .. }
            | Event::IntervalCompleted { interval, .. } => interval.as_ref(),
            _ => None,
        }
    }

    /// Title and body to notify with. Only natural transitions notify.
    pub fn notification(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Event::IntervalCompleted { to, .. } => Some(to.transition_notice()),
            _ => None,
        }
    }
}
