//! Focus/break interval timer.

mod engine;
mod session;

pub use engine::{
    format_time_left, CompletedInterval, IntervalTimer, TaskBinding, TimerConfig, TimerMode,
    TimerState, MIN_LOGGED_SECS,
};
pub use session::{Clock, TimerSession};
