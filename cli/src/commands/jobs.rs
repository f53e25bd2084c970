use serde::Serialize;
use taskpulse_core::api::{
    describe_cron, CliError, NewScheduledJob, ScheduledJob, TaskEngine, TaskKind,
};

use super::cli::{IdArgs, JobCreateArgs, JobListArgs, JobsCommand};
use super::params::parse_params;
use super::tasks::print_json;
use crate::render;

#[derive(Serialize)]
struct JobOut<'a> {
    #[serde(flatten)]
    job: &'a ScheduledJob,
    schedule: String,
}

pub async fn handle(engine: &TaskEngine, cmd: JobsCommand, json: bool) -> Result<i32, CliError> {
    let jobs = &engine.jobs;
    match cmd {
        JobsCommand::List(JobListArgs { watch: false }) => {
            let list = jobs.list().await?;
            print_jobs(&list, json)?;
        }
        JobsCommand::List(JobListArgs { watch: true }) => {
            return watch_jobs(engine, json).await;
        }
        JobsCommand::Create(args) => {
            let job = new_job(args)?;
            let id = jobs.create(&job).await?;
            if json {
                print_json(&serde_json::json!({"id": id, "job": job}))?;
            } else {
                println!(
                    "scheduled {} ({})",
                    id.as_deref().unwrap_or(&job.name),
                    describe_cron(&job.cron_expression)
                );
            }
        }
        JobsCommand::Pause(IdArgs { id }) => {
            jobs.pause(&id).await?;
            report(&id, false, json)?;
        }
        JobsCommand::Resume(IdArgs { id }) => {
            jobs.resume(&id).await?;
            report(&id, true, json)?;
        }
        JobsCommand::Delete(IdArgs { id }) => {
            jobs.delete(&id).await?;
            if json {
                print_json(&serde_json::json!({"deleted": id}))?;
            } else {
                println!("deleted job {id}");
            }
        }
    }
    Ok(0)
}

fn print_jobs(list: &[ScheduledJob], json: bool) -> Result<(), CliError> {
    if json {
        let out: Vec<JobOut<'_>> = list
            .iter()
            .map(|job| JobOut {
                job,
                schedule: describe_cron(&job.cron_expression),
            })
            .collect();
        print_json(&out)
    } else {
        println!("{}", render::render_jobs(list));
        Ok(())
    }
}

/// Re-prints the job table each time the refresh loop applies a new list.
/// Returns 130 on Ctrl-C.
async fn watch_jobs(engine: &TaskEngine, json: bool) -> Result<i32, CliError> {
    let mut applied = engine.jobs.subscribe();
    engine.start_job_refresh();
    let code = loop {
        tokio::select! {
            changed = applied.changed() => {
                if changed.is_err() {
                    break 0;
                }
                print_jobs(&engine.jobs.jobs(), json)?;
            }
            _ = tokio::signal::ctrl_c() => break 130,
        }
    };
    engine.shutdown();
    Ok(code)
}

fn new_job(args: JobCreateArgs) -> Result<NewScheduledJob, CliError> {
    if args.cron.split_whitespace().count() == 0 {
        return Err(CliError::InvalidArgument("--cron must not be empty".into()));
    }
    Ok(NewScheduledJob {
        name: args.name,
        cron_expression: args.cron.trim().to_string(),
        task_kind: TaskKind::parse_lenient(&args.kind),
        task_params: parse_params(&args.params)?,
        enabled: !args.disabled,
    })
}

fn report(id: &str, enabled: bool, json: bool) -> Result<(), CliError> {
    if json {
        print_json(&serde_json::json!({"id": id, "enabled": enabled}))
    } else {
        // Pausing a job leaves tasks it already spawned running.
        let state = if enabled { "resumed" } else { "paused" };
        println!("job {id} {state}");
        Ok(())
    }
}
