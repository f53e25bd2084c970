use thiserror::Error;

use super::backend::{BackendError, TaskConflict};
use crate::dispatch::CommandKind;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("command failed: {0}")]
    Command(#[from] CommandError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Outcome of a rejected control action.
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    /// `create` collided with an active task; carries remedy data.
    #[error("task already exists: {} is {}", .0.task_id, .0.status)]
    Conflict(TaskConflict),
    #[error("{command} failed: {source}")]
    Failed {
        command: CommandKind,
        #[source]
        source: BackendError,
    },
}

impl CommandError {
    pub fn from_backend(command: CommandKind, err: BackendError) -> Self {
        match err {
            BackendError::Conflict(conflict) if command == CommandKind::Create => {
                Self::Conflict(conflict)
            }
            source => Self::Failed { command, source },
        }
    }

    pub fn conflict(&self) -> Option<&TaskConflict> {
        match self {
            Self::Conflict(c) => Some(c),
            Self::Failed { .. } => None,
        }
    }
}

/// A raw server record the normalizer could not turn into a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no usable id")]
    MissingId,
}
