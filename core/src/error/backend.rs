use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskStatus;

/// The task already occupying the backend's single-task slot.
///
/// Returned instead of a generic failure when `create` collides with an
/// active task of the same kind, so callers can offer to manage that task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConflict {
    pub task_id: String,
    pub status: TaskStatus,
    /// Percent complete as reported by the server, if any.
    pub progress: Option<u8>,
    pub message: Option<String>,
}

/// Failures surfaced by a [`crate::backend::TaskBackend`] or
/// [`crate::backend::JobBackend`] implementation.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("task already exists: {} ({})", .0.task_id, .0.status)]
    Conflict(TaskConflict),
}

impl BackendError {
    /// Errors a poll loop should count toward its failure threshold.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Decode(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound(_) | Self::Conflict(_) => false,
        }
    }
}
