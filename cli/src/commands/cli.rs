use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

#[derive(Parser, Debug)]
#[command(name = "taskpulse", version, about = "Track and control server-executed background tasks")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Executor base URL (overrides config and TASKPULSE_BASE_URL).
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Print machine-readable JSON instead of tables.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Background tasks (data updates, screens, training runs).
    #[command(subcommand)]
    Tasks(TasksCommand),
    /// Cron-triggered job definitions.
    #[command(subcommand)]
    Jobs(JobsCommand),
}

#[derive(Subcommand, Debug)]
pub enum TasksCommand {
    List(ListArgs),
    Show(IdArgs),
    /// Live progress until the task finishes or Ctrl-C.
    Watch(WatchArgs),
    Create(CreateArgs),
    Pause(IdArgs),
    Resume(IdArgs),
    Stop(IdArgs),
    Delete(IdArgs),
    /// Delete finished tasks older than N days.
    Cleanup(CleanupArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct IdArgs {
    pub id: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, value_enum)]
    pub status: Option<StatusFilter>,

    /// Task kind, e.g. `update`, `screen`, `prediction_training`.
    #[arg(long)]
    pub kind: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WatchArgs {
    /// Task to follow; defaults to the active task.
    pub id: Option<String>,

    /// Override the poll interval for this session.
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CreateArgs {
    /// Task kind, e.g. `update`, `screen`, `prediction_training`.
    pub kind: String,

    /// Task parameter (KEY=VALUE, VALUE parsed as JSON when possible).
    /// Can be specified multiple times.
    #[arg(long = "param", action = clap::ArgAction::Append)]
    pub params: Vec<String>,

    /// Follow the new task with the live view.
    #[arg(long, default_value_t = false)]
    pub watch: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CleanupArgs {
    #[arg(long, default_value_t = 7)]
    pub older_than_days: u32,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    List(JobListArgs),
    Create(JobCreateArgs),
    Pause(IdArgs),
    Resume(IdArgs),
    Delete(IdArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct JobListArgs {
    /// Keep re-listing on the configured job interval until Ctrl-C.
    #[arg(long)]
    pub watch: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct JobCreateArgs {
    #[arg(long)]
    pub name: String,

    /// Five-field cron expression; validated by the scheduler.
    #[arg(long)]
    pub cron: String,

    #[arg(long, default_value = "update")]
    pub kind: String,

    #[arg(long = "param", action = clap::ArgAction::Append)]
    pub params: Vec<String>,

    /// Register the job paused.
    #[arg(long, default_value_t = false)]
    pub disabled: bool,
}
