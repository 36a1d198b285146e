//! # Pomotask Core Library
//!
//! Core logic for a personal task tracker with due-date reminders and a
//! focus/break interval timer. Hosts (the `pomotask` CLI, or any other
//! front end) construct the engines once and drive them through plain method
//! calls; nothing here owns a global. The background loops run on the host's
//! tokio runtime.
//!
//! ## Architecture
//!
//! - **Reminder Scheduler**: one background tokio task that polls the store for
//!   due reminders, notifies, and marks each one sent exactly once
//! - **Interval Timer**: a pure focus/break state machine, wrapped per session
//!   by [`TimerSession`] with an optional 1 Hz driver
//! - **Storage**: SQLite persistence for tasks, reminders, and the session
//!   log, plus TOML configuration
//! - **Notify**: the [`Notifier`] boundary for user-facing alerts
//!
//! ## Key Components
//!
//! - [`ReminderScheduler`]: start-once reminder loop with hot-reloadable settings
//! - [`IntervalTimer`]: timer state machine
//! - [`TimerSession`]: thread-safe, host-facing timer
//! - [`Database`]: task, reminder, and session persistence
//! - [`Config`]: application configuration management

mod background;
pub mod error;
pub mod events;
pub mod notify;
pub mod scheduler;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, NotifyError, ValidationError};
pub use events::Event;
pub use notify::{LogNotifier, Notifier, RecordingNotifier};
pub use scheduler::{IterationReport, ReminderScheduler, SchedulerSettings};
pub use storage::{Config, Database, ReminderStore, SessionStore};
pub use timer::{IntervalTimer, TimerConfig, TimerMode, TimerSession, TimerState};
