//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `taskpulse_core::api` instead of reaching into internal modules.

pub use crate::backend::{CreateTaskRequest, JobBackend, TaskBackend};
pub use crate::config::{
    apply_env_overrides, get_data_dir, load_default, load_from_path, AppConfig, BackendConfig,
    LoggingConfig, PollingConfig,
};
pub use crate::context::{AppContext, Backends, BackendsFactory, TaskEngine};
pub use crate::dispatch::{CommandDispatcher, CommandKind, CreatedTask, PendingCommand};
pub use crate::error::{
    BackendError, CliError, CommandError, MalformedRecord, TaskConflict, TransitionError,
};
pub use crate::jobs::{
    describe_cron, normalize_job, JobManager, NewScheduledJob, RefreshHandle, ScheduledJob,
};
pub use crate::poller::{PollMode, PollOutcome, PollingController, PollingSnapshot, PollingStatus};
pub use crate::registry::{RegistryEvent, RegistrySnapshot, TaskRegistry};
pub use crate::task::{
    format_duration, format_throughput, normalize_batch, normalize_conflict, normalize_task,
    progress_view, unwrap_list, ProgressView, ResultSummary, Task, TaskAction, TaskKind,
    TaskStatus, Tone,
};
