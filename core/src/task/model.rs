//! Canonical task shape shared by every component of the engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of server-side job a task represents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Bulk market-data refresh. Serialised as the literal `update`,
    /// which is also the fallback for records without a kind.
    #[default]
    #[serde(rename = "update")]
    DataUpdate,
    Screen,
    PredictionTraining,
    /// Any kind this client does not know yet, kept verbatim.
    #[serde(untagged)]
    Other(String),
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DataUpdate => "update",
            Self::Screen => "screen",
            Self::PredictionTraining => "prediction_training",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Lenient parse used by the normalizer; never fails.
    pub fn parse_lenient(raw: &str) -> Self {
        let key = raw.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "" | "update" | "data_update" | "dataupdate" | "full_update" | "incremental_update" => {
                Self::DataUpdate
            }
            "screen" | "screening" | "stock_screen" => Self::Screen,
            "prediction_training" | "training" | "ml_training" | "train" | "model_training" => {
                Self::PredictionTraining
            }
            _ => Self::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Maps the many spellings executors use onto the canonical states.
    /// Returns `None` for strings that match nothing.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace('-', "_");
        let status = match key.as_str() {
            "pending" | "queued" | "waiting" | "created" | "scheduled" => Self::Pending,
            "running" | "in_progress" | "processing" | "started" | "active" => Self::Running,
            "paused" | "suspended" => Self::Paused,
            "completed" | "complete" | "success" | "succeeded" | "done" | "finished" => {
                Self::Completed
            }
            "failed" | "failure" | "error" | "errored" => Self::Failed,
            "stopped" | "cancelled" | "canceled" | "terminated" | "aborted" => Self::Stopped,
            _ => return None,
        };
        Some(status)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-unit outcome lists reported once a task is terminal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub skipped: Vec<String>,
    /// Original payload, kept so unknown shapes are not lost.
    #[serde(default)]
    pub raw: Value,
}

impl ResultSummary {
    pub fn is_empty(&self) -> bool {
        self.success.is_empty() && self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// One tracked unit of server-executed background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    pub last_error: Option<String>,
    pub result_summary: Option<ResultSummary>,
}

impl Task {
    /// A freshly created, not yet sized task.
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: TaskStatus::Pending,
            total: 0,
            processed: 0,
            failed: 0,
            started_at: None,
            ended_at: None,
            params: BTreeMap::new(),
            last_error: None,
            result_summary: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }
}
