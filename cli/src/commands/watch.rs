//! Live progress view driven by the poll loop.

use std::time::Duration;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use taskpulse_core::api::{
    format_duration, progress_view, CliError, PollingStatus, RegistryEvent, Task, TaskEngine,
    TaskStatus,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::tasks::print_json;

struct WatchBar {
    bar: ProgressBar,
    enabled: bool,
}

impl WatchBar {
    fn new(enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
                enabled,
            };
        }
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold} [{bar:40.cyan/blue}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message("waiting for first poll");
        Self { bar, enabled }
    }

    fn show(&self, task: &Task) {
        let view = progress_view(task, Utc::now());
        self.bar.set_prefix(task.id.clone());
        self.bar.set_position(u64::from(view.percent));
        let mut msg = view.label;
        if let Some(eta) = view.eta {
            msg.push_str(&format!(" · eta {}", format_duration(eta)));
        }
        self.bar.set_message(msg);
    }

    fn note(&self, msg: &str) {
        if self.enabled {
            self.bar.println(msg);
        } else {
            eprintln!("{msg}");
        }
    }

    fn finish(&self, task: &Task) {
        let view = progress_view(task, Utc::now());
        self.bar.set_position(u64::from(view.percent));
        self.bar.finish_with_message(view.label);
    }
}

/// Follows `target` (or whatever task is active) until it reaches a terminal
/// status or the user interrupts. Returns 0 on completion, 1 when the task
/// failed or was stopped, 130 on Ctrl-C.
pub async fn run(engine: &TaskEngine, target: Option<String>, json: bool) -> Result<i32, CliError> {
    let mut events = engine.registry.subscribe();
    let mut status_rx = engine.poller.subscribe_status();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let bar = WatchBar::new(!json);

    engine.poller.start_polling();
    let mut stdin_open = true;
    let mut followed = target;
    let mut last_version = 0;

    let code = loop {
        // Re-render from the registry on every wakeup; events only say when.
        let version = engine.registry.version();
        if version != last_version {
            last_version = version;
            if followed.is_none() {
                followed = engine.registry.active_task().map(|t| t.id);
            }
            match followed.as_deref().map(|id| engine.registry.get(id)) {
                Some(Some(task)) => {
                    if json {
                        print_json(&serde_json::json!({
                            "task": &task,
                            "progress": progress_view(&task, Utc::now()),
                        }))?;
                    } else {
                        bar.show(&task);
                    }
                    if task.is_terminal() {
                        bar.finish(&task);
                        let code = if task.status == TaskStatus::Completed { 0 } else { 1 };
                        break code;
                    }
                }
                Some(None) => {
                    let id = followed.as_deref().unwrap_or_default();
                    bar.note(&format!("task {id} is no longer reported by the executor"));
                    break 1;
                }
                None => bar.bar.set_message("no active task; waiting"),
            }
        }

        tokio::select! {
            ev = events.recv() => match ev {
                Ok(RegistryEvent::TerminalViolation { task_id, from, to }) => {
                    bar.note(&format!("task {task_id} went {from} -> {to}; earlier record kept in history"));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break 1,
            },
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break 1;
                }
                let status = status_rx.borrow_and_update().clone();
                if let PollingStatus::CircuitOpen { failures, last_error } = status {
                    bar.note(&format!(
                        "polling stopped after {failures} consecutive failures: {last_error}"
                    ));
                    if stdin_open {
                        bar.note("press Enter to resume polling, Ctrl-C to quit");
                    } else {
                        bar.note("run `taskpulse tasks watch` again to resume polling");
                    }
                    bar.bar.set_message("polling stopped");
                }
            },
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) if engine.poller.status().is_circuit_open() => {
                        bar.note("resuming polling");
                        engine.poller.start_polling();
                    }
                    Ok(Some(_)) => {}
                    // stdin closed (e.g. piped); keep watching without the prompt
                    Ok(None) | Err(_) => stdin_open = false,
                }
            },
            _ = tokio::signal::ctrl_c() => {
                bar.bar.abandon_with_message("interrupted");
                break 130;
            },
        }
    };

    engine.poller.stop_polling();
    Ok(code)
}
