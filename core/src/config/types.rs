use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or the data dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "warn" or "taskpulse.poll=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Where the task executor and scheduler services live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout_ms() -> u64 {
    15_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Task-list cadence.
    #[serde(default = "default_task_interval_ms")]
    pub task_interval_ms: u64,

    /// Scheduled-job cadence; these change far less often.
    #[serde(default = "default_job_interval_ms")]
    pub job_interval_ms: u64,

    /// Consecutive fetch failures that stop the timer.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Registry broadcast buffer.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_task_interval_ms() -> u64 {
    10_000
}

fn default_job_interval_ms() -> u64 {
    60_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_event_capacity() -> usize {
    256
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            task_interval_ms: default_task_interval_ms(),
            job_interval_ms: default_job_interval_ms(),
            failure_threshold: default_failure_threshold(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl PollingConfig {
    pub fn task_interval(&self) -> Duration {
        Duration::from_millis(self.task_interval_ms)
    }

    pub fn job_interval(&self) -> Duration {
        Duration::from_millis(self.job_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.task_interval_ms == 0 {
            return Err("polling.task_interval_ms must be > 0".into());
        }
        if self.job_interval_ms == 0 {
            return Err("polling.job_interval_ms must be > 0".into());
        }
        if self.failure_threshold == 0 {
            return Err("polling.failure_threshold must be > 0".into());
        }
        Ok(())
    }
}
