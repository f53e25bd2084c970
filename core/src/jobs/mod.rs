//! Recurring job definitions (cron-triggered).

pub mod cron;
pub mod manager;
pub mod model;

pub use cron::describe_cron;
pub use manager::{JobManager, RefreshHandle};
pub use model::{normalize_job, normalize_jobs, NewScheduledJob, ScheduledJob};
