//! Interactive host: reminder scheduler plus one timer session driven from
//! stdin until `quit`, EOF or Ctrl-C.

use std::sync::Arc;

use pomotask_core::notify::{LogNotifier, Notifier};
use pomotask_core::storage::{Config, Database};
use pomotask_core::timer::format_time_left;
use pomotask_core::{ReminderScheduler, TimerSession};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::CmdResult;

const HELP: &str = "commands: start [task-id] | pause | reset | mode <focus|short_break|long_break> \
| config <focus> <short> <long> <interval> | poll <secs> | notify on|off | status | quit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Start(Option<String>),
    Pause,
    Reset,
    Mode(String),
    Config([i64; 4]),
    Poll(u64),
    Notify(bool),
    Status,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();
        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("start", []) => Command::Start(None),
            ("start", [id]) => Command::Start(Some((*id).to_string())),
            ("pause", []) => Command::Pause,
            ("reset", []) => Command::Reset,
            ("mode", [mode]) => Command::Mode((*mode).to_string()),
            ("config", [f, s, l, n]) => {
                let mut values = [0i64; 4];
                for (slot, raw) in values.iter_mut().zip([f, s, l, n]) {
                    *slot = raw
                        .parse()
                        .map_err(|_| format!("not a number: {raw}"))?;
                }
                Command::Config(values)
            }
            ("poll", [secs]) => Command::Poll(
                secs.parse()
                    .map_err(|_| format!("not a number of seconds: {secs}"))?,
            ),
            ("notify", ["on"]) => Command::Notify(true),
            ("notify", ["off"]) => Command::Notify(false),
            ("status", []) => Command::Status,
            ("help" | "?", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            _ => return Err(format!("unrecognized command: {}", line.trim())),
        };
        Ok(Some(command))
    }
}

struct Host {
    scheduler: ReminderScheduler,
    session: TimerSession,
    /// Task from `--task`, bound on the first `start` without an id.
    pending_task: Option<String>,
}

impl Host {
    /// Returns `false` when the host should exit.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start(task) => {
                let task = task.or_else(|| self.pending_task.take());
                if self.session.start(task.as_deref()).is_none() {
                    println!("already running");
                }
                self.print_status();
            }
            Command::Pause => {
                if self.session.pause().is_none() {
                    println!("not running");
                }
                self.print_status();
            }
            Command::Reset => {
                self.session.reset();
                self.print_status();
            }
            Command::Mode(mode) => {
                if self.session.switch_mode(&mode).is_none() {
                    println!("unknown mode: {mode}");
                }
                self.print_status();
            }
            Command::Config([focus, short, long, interval]) => {
                self.session.apply_config(focus, short, long, interval);
                let config = self.session.config();
                println!(
                    "timer: focus {}m, short {}m, long {}m, long break every {}",
                    config.focus_minutes,
                    config.short_break_minutes,
                    config.long_break_minutes,
                    config.long_break_interval
                );
            }
            Command::Poll(secs) => {
                self.scheduler.update_config(Some(secs), None);
                println!(
                    "reminder poll interval: {}s",
                    self.scheduler.effective_poll_interval().as_secs()
                );
            }
            Command::Notify(enabled) => {
                self.scheduler.update_config(None, Some(enabled));
                println!("notifications {}", if enabled { "on" } else { "off" });
            }
            Command::Status => self.print_status(),
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
        }
        true
    }

    fn print_status(&self) {
        let state = self.session.snapshot();
        let task = state
            .bound_task_id
            .map(|id| format!("  task {id}"))
            .unwrap_or_default();
        println!(
            "{} {}  {}  focus done: {}{task}",
            state.mode.label(),
            format_time_left(state.time_left_secs),
            if state.running { "running" } else { "paused" },
            state.total_focus_completed,
        );
    }
}

pub fn run(task: Option<String>) -> CmdResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(serve(task));
    // A pending stdin read would otherwise hold up runtime teardown.
    runtime.shutdown_background();
    outcome
}

async fn serve(task: Option<String>) -> CmdResult {
    let config = Config::load_or_default();
    let db = Arc::new(Database::open()?);
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let scheduler = ReminderScheduler::new(db.clone(), notifier.clone());
    let settings = config.scheduler_settings();
    scheduler
        .start(settings.poll_interval_secs, settings.notifications_enabled)
        .await?;

    let session = TimerSession::new(config.timer_config(), db, notifier);
    session.start_driver().await;

    let mut host = Host {
        scheduler,
        session,
        pending_task: task,
    };
    println!("{HELP}");
    host.print_status();

    let outcome = read_commands(&mut host).await;

    if !host.session.stop_driver().await {
        tracing::warn!("timer driver still busy at exit");
    }
    if !host.scheduler.stop().await {
        tracing::warn!("reminder scheduler still busy at exit");
    }
    outcome
}

async fn read_commands(host: &mut Host) -> CmdResult {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("stdin closed");
                    return Ok(());
                };
                match Command::parse(&line) {
                    Ok(Some(command)) => {
                        if !host.handle(command) {
                            return Ok(());
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{message}; try 'help'"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
        }
    }
}
