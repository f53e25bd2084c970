//! Plain-text rendering for the task and job commands.

use chrono::{DateTime, Local, Utc};
use taskpulse_core::api::{
    describe_cron, format_duration, format_throughput, progress_view, PendingCommand,
    ScheduledJob, Task, TaskConflict, TaskStatus,
};

fn local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn render_tasks(tasks: &[Task], active_id: Option<&str>, now: DateTime<Utc>) -> String {
    if tasks.is_empty() {
        return "no tasks".to_string();
    }
    let mut out = format!(
        "  {:<24} {:<20} {:<10} {}\n",
        "ID", "KIND", "STATUS", "PROGRESS"
    );
    for task in tasks {
        let marker = if Some(task.id.as_str()) == active_id { "*" } else { " " };
        let view = progress_view(task, now);
        out.push_str(&format!(
            "{marker} {:<24} {:<20} {:<10} {}\n",
            task.id,
            task.kind.to_string(),
            task.status.to_string(),
            view.label
        ));
    }
    out.pop();
    out
}

pub fn render_task_detail(
    task: &Task,
    pending: Option<&PendingCommand>,
    now: DateTime<Utc>,
) -> String {
    let view = progress_view(task, now);
    let mut lines = vec![
        format!("id:        {}", task.id),
        format!("kind:      {}", task.kind),
        format!("status:    {}", task.status),
        format!("progress:  {}", view.label),
    ];
    if task.failed > 0 {
        lines.push(format!("failed:    {}", task.failed));
    }
    if let Some(ts) = task.started_at {
        lines.push(format!("started:   {}", local(ts)));
    }
    if let Some(ts) = task.ended_at {
        lines.push(format!("ended:     {}", local(ts)));
    }
    if let Some(d) = view.duration {
        lines.push(format!("elapsed:   {}", format_duration(d)));
    }
    if let Some(rate) = view.throughput_per_min {
        lines.push(format!("rate:      {}", format_throughput(rate)));
    }
    if let Some(eta) = view.eta {
        lines.push(format!("eta:       {}", format_duration(eta)));
    }
    if let Some(rate) = view.success_rate {
        lines.push(format!("success:   {:.1}%", rate * 100.0));
    }
    if let Some(cmd) = pending {
        lines.push(format!(
            "pending:   {} (waiting for {})",
            cmd.action, cmd.expected
        ));
    }
    if let Some(summary) = task.result_summary.as_ref().filter(|s| !s.is_empty()) {
        lines.push(format!(
            "result:    {} ok, {} failed, {} skipped",
            summary.success.len(),
            summary.failed.len(),
            summary.skipped.len()
        ));
    }
    for (k, v) in &task.params {
        lines.push(format!("param:     {k}={v}"));
    }
    lines.join("\n")
}

pub fn render_jobs(jobs: &[ScheduledJob]) -> String {
    if jobs.is_empty() {
        return "no scheduled jobs".to_string();
    }
    let mut out = format!(
        "{:<20} {:<24} {:<8} {:<32} {}\n",
        "ID", "NAME", "STATE", "SCHEDULE", "NEXT RUN"
    );
    for job in jobs {
        let state = if job.enabled { "enabled" } else { "paused" };
        let next = job
            .trusted_next_run()
            .map(local)
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<20} {:<24} {:<8} {:<32} {}\n",
            job.id,
            job.name,
            state,
            describe_cron(&job.cron_expression),
            next
        ));
    }
    out.pop();
    out
}

/// What to tell the user when `create` hits an existing task.
pub fn conflict_remedy(conflict: &TaskConflict) -> String {
    let progress = conflict
        .progress
        .map(|p| format!(" at {p}%"))
        .unwrap_or_default();
    let id = &conflict.task_id;
    let mut msg = format!("a task is already {}{progress}: {id}", conflict.status);
    if let Some(server) = &conflict.message {
        msg.push_str(&format!("\n  server: {server}"));
    }
    if id.is_empty() {
        msg.push_str("\n  run `taskpulse tasks list` to find it");
        return msg;
    }
    let hint = match conflict.status {
        TaskStatus::Paused => format!(
            "resume it with `taskpulse tasks resume {id}` or stop it with `taskpulse tasks stop {id}`"
        ),
        TaskStatus::Running | TaskStatus::Pending => format!(
            "follow it with `taskpulse tasks watch {id}` or stop it with `taskpulse tasks stop {id}`"
        ),
        _ => format!("inspect it with `taskpulse tasks show {id}`"),
    };
    msg.push_str(&format!("\n  {hint}"));
    msg
}
