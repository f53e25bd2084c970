//! Progress, duration and throughput derived from a [`Task`].
//!
//! Everything here is a pure function of the task and a caller-supplied
//! `now`, so views are reproducible in tests and never touch the registry.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{Task, TaskStatus};

/// Visual intent for a progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Neutral,
    Info,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    /// `floor(processed / total * 100)`, or 0 while unsized.
    pub percent: u8,
    /// No work sized yet; render "initializing", never "0%".
    pub is_initializing: bool,
    /// Server reports 100% but has not flipped to a terminal status yet.
    pub is_complete_but_running: bool,
    pub label: String,
    pub tone: Tone,
    pub duration: Option<Duration>,
    /// Units per minute.
    pub throughput_per_min: Option<f64>,
    pub eta: Option<Duration>,
    /// Share of processed units that did not fail, `0.0..=1.0`.
    pub success_rate: Option<f64>,
}

pub fn percent(task: &Task) -> u8 {
    if task.total == 0 {
        return 0;
    }
    let done = task.processed.min(task.total) as u128;
    (done * 100 / task.total as u128) as u8
}

/// Wall time since the task started, up to its end if it has one.
/// Clamped to zero when client and server clocks disagree.
pub fn elapsed(task: &Task, now: DateTime<Utc>) -> Option<Duration> {
    let started = task.started_at?;
    let end = task.ended_at.unwrap_or(now);
    Some((end - started).to_std().unwrap_or(Duration::ZERO))
}

/// Units per minute; undefined for sub-second samples or no progress.
pub fn throughput_per_min(task: &Task, elapsed: Option<Duration>) -> Option<f64> {
    let elapsed = elapsed?;
    if task.processed == 0 || elapsed < Duration::from_secs(1) {
        return None;
    }
    Some(task.processed as f64 / (elapsed.as_secs_f64() / 60.0))
}

pub fn progress_view(task: &Task, now: DateTime<Utc>) -> ProgressView {
    let percent = percent(task);
    let in_flight = matches!(task.status, TaskStatus::Pending | TaskStatus::Running);
    let is_initializing = task.total == 0 && in_flight;
    let is_complete_but_running =
        percent == 100 && task.processed > 0 && task.status == TaskStatus::Running;

    let duration = elapsed(task, now);
    let throughput = throughput_per_min(task, duration);

    let eta = match throughput {
        Some(rate) if rate > 0.0 && task.status == TaskStatus::Running && task.total > 0 => {
            let remaining = task.total.saturating_sub(task.processed);
            (remaining > 0).then(|| Duration::from_secs_f64(remaining as f64 / rate * 60.0))
        }
        _ => None,
    };

    let success_rate = (task.processed > 0).then(|| {
        let ok = task.processed.saturating_sub(task.failed);
        ok as f64 / task.processed as f64
    });

    let (label, tone) = label_and_tone(task, percent, is_initializing, is_complete_but_running);

    ProgressView {
        percent,
        is_initializing,
        is_complete_but_running,
        label,
        tone,
        duration,
        throughput_per_min: throughput,
        eta,
        success_rate,
    }
}

fn label_and_tone(
    task: &Task,
    percent: u8,
    is_initializing: bool,
    is_complete_but_running: bool,
) -> (String, Tone) {
    if is_initializing {
        return ("initializing".to_string(), Tone::Info);
    }
    if is_complete_but_running {
        return ("completed, finalizing".to_string(), Tone::Success);
    }
    let counts = format!("{}/{}", task.processed, task.total);
    match task.status {
        TaskStatus::Pending => ("queued".to_string(), Tone::Neutral),
        TaskStatus::Running => (format!("running {percent}% ({counts})"), Tone::Info),
        TaskStatus::Paused if task.total > 0 => {
            (format!("paused at {percent}% ({counts})"), Tone::Warning)
        }
        TaskStatus::Paused => ("paused".to_string(), Tone::Warning),
        TaskStatus::Completed if task.failed > 0 => (
            format!("completed ({counts}, {} failed)", task.failed),
            Tone::Success,
        ),
        TaskStatus::Completed => (format!("completed ({counts})"), Tone::Success),
        TaskStatus::Failed => match task.last_error.as_deref() {
            Some(err) => (format!("failed: {err}"), Tone::Danger),
            None => ("failed".to_string(), Tone::Danger),
        },
        TaskStatus::Stopped if task.total > 0 => {
            (format!("stopped at {percent}% ({counts})"), Tone::Warning)
        }
        TaskStatus::Stopped => ("stopped".to_string(), Tone::Warning),
    }
}

/// `45s`, `3m 05s`, `1h 02m 03s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

pub fn format_throughput(per_min: f64) -> String {
    if per_min >= 100.0 {
        format!("{per_min:.0}/min")
    } else {
        format!("{per_min:.1}/min")
    }
}
