use chrono::Utc;
use serde::Serialize;
use taskpulse_core::api::{
    progress_view, CliError, CommandError, CreateTaskRequest, PollOutcome, ProgressView, Task,
    TaskEngine, TaskKind, TaskStatus,
};

use super::cli::{CleanupArgs, CreateArgs, IdArgs, ListArgs, StatusFilter, TasksCommand};
use super::params::parse_params;
use super::watch;
use crate::render;

#[derive(Serialize)]
struct TaskOut<'a> {
    #[serde(flatten)]
    task: &'a Task,
    progress: ProgressView,
}

impl From<StatusFilter> for TaskStatus {
    fn from(f: StatusFilter) -> Self {
        match f {
            StatusFilter::Pending => TaskStatus::Pending,
            StatusFilter::Running => TaskStatus::Running,
            StatusFilter::Paused => TaskStatus::Paused,
            StatusFilter::Completed => TaskStatus::Completed,
            StatusFilter::Failed => TaskStatus::Failed,
            StatusFilter::Stopped => TaskStatus::Stopped,
        }
    }
}

pub async fn handle(engine: &TaskEngine, cmd: TasksCommand, json: bool) -> Result<i32, CliError> {
    match cmd {
        TasksCommand::List(args) => list(engine, args, json).await,
        TasksCommand::Show(IdArgs { id }) => show(engine, &id, json).await,
        TasksCommand::Watch(args) => watch::run(engine, args.id, json).await,
        TasksCommand::Create(args) => create(engine, args, json).await,
        TasksCommand::Pause(IdArgs { id }) => {
            engine.dispatcher.pause(&id).await?;
            report_control(engine, &id, json)
        }
        TasksCommand::Resume(IdArgs { id }) => {
            engine.dispatcher.resume(&id).await?;
            report_control(engine, &id, json)
        }
        TasksCommand::Stop(IdArgs { id }) => {
            engine.dispatcher.stop(&id).await?;
            report_control(engine, &id, json)
        }
        TasksCommand::Delete(IdArgs { id }) => {
            engine.dispatcher.delete(&id).await?;
            if json {
                print_json(&serde_json::json!({"deleted": id}))?;
            } else {
                println!("deleted {id}");
            }
            Ok(0)
        }
        TasksCommand::Cleanup(CleanupArgs { older_than_days }) => {
            let removed = engine.dispatcher.cleanup(older_than_days).await?;
            if json {
                print_json(&serde_json::json!({"deleted": removed}))?;
            } else {
                println!("removed {removed} finished task(s) older than {older_than_days} day(s)");
            }
            Ok(0)
        }
    }
}

/// One synchronous fetch; a one-shot command has no timer to wait for.
pub async fn refresh(engine: &TaskEngine) -> Result<(), CliError> {
    match engine.poller.poll_now().await {
        PollOutcome::Failed { error, .. } | PollOutcome::CircuitOpened { error, .. } => {
            Err(CliError::Backend(error))
        }
        _ => Ok(()),
    }
}

async fn list(engine: &TaskEngine, args: ListArgs, json: bool) -> Result<i32, CliError> {
    refresh(engine).await?;
    let registry = &engine.registry;
    let mut tasks = match args.status {
        Some(status) => registry.by_status(status.into()),
        None => registry.tasks(),
    };
    if let Some(kind) = args.kind.as_deref() {
        let kind = TaskKind::parse_lenient(kind);
        tasks.retain(|t| t.kind == kind);
    }

    let now = Utc::now();
    if json {
        let out: Vec<TaskOut<'_>> = tasks
            .iter()
            .map(|task| TaskOut {
                task,
                progress: progress_view(task, now),
            })
            .collect();
        print_json(&out)?;
    } else {
        let active = registry.active_task().map(|t| t.id);
        println!("{}", render::render_tasks(&tasks, active.as_deref(), now));
    }
    Ok(0)
}

async fn show(engine: &TaskEngine, id: &str, json: bool) -> Result<i32, CliError> {
    let task = engine.dispatcher.inspect(id).await?;
    let now = Utc::now();
    if json {
        print_json(&TaskOut {
            task: &task,
            progress: progress_view(&task, now),
        })?;
    } else {
        let pending = engine.dispatcher.pending_command(id);
        println!("{}", render::render_task_detail(&task, pending.as_ref(), now));
    }
    Ok(0)
}

async fn create(engine: &TaskEngine, args: CreateArgs, json: bool) -> Result<i32, CliError> {
    let mut request = CreateTaskRequest::new(TaskKind::parse_lenient(&args.kind));
    request.params = parse_params(&args.params)?;

    let created = match engine.dispatcher.create(request).await {
        Ok(created) => created,
        Err(CommandError::Conflict(conflict)) => {
            if json {
                print_json(&serde_json::json!({"conflict": conflict}))?;
            } else {
                eprintln!("{}", render::conflict_remedy(&conflict));
            }
            return Err(CliError::Command(CommandError::Conflict(conflict)));
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        print_json(&created)?;
    } else {
        match created.task_id.as_deref() {
            Some(id) => println!("created {id}"),
            None => println!("task submitted"),
        }
    }

    if args.watch {
        return watch::run(engine, created.task_id, json).await;
    }
    Ok(0)
}

/// Control commands only request a transition; the status shown is what the
/// executor reported after the resync.
fn report_control(engine: &TaskEngine, id: &str, json: bool) -> Result<i32, CliError> {
    let current = engine.registry.get(id);
    let pending = engine.dispatcher.pending_command(id);
    if json {
        print_json(&serde_json::json!({
            "task_id": id,
            "status": current.as_ref().map(|t| t.status),
            "pending": pending,
        }))?;
        return Ok(0);
    }
    match (current, pending) {
        (Some(task), Some(cmd)) => println!(
            "{} requested for {id}; executor still reports {} (waiting for {})",
            cmd.action, task.status, cmd.expected
        ),
        (Some(task), None) => println!("{id} is now {}", task.status),
        (None, _) => println!("request accepted for {id}"),
    }
    Ok(0)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let s = serde_json::to_string_pretty(value).map_err(|e| CliError::Anyhow(e.into()))?;
    println!("{s}");
    Ok(())
}
