use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::task::{TaskAction, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Create,
    Pause,
    Resume,
    Stop,
    Delete,
    Cleanup,
    Inspect,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Delete => "delete",
            Self::Cleanup => "cleanup",
            Self::Inspect => "inspect",
        }
    }
}

impl From<TaskAction> for CommandKind {
    fn from(action: TaskAction) -> Self {
        match action {
            TaskAction::Pause => Self::Pause,
            TaskAction::Resume => Self::Resume,
            TaskAction::Stop => Self::Stop,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control command the server accepted but no poll has confirmed yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingCommand {
    #[serde(serialize_with = "serialize_action")]
    pub action: TaskAction,
    pub expected: TaskStatus,
    pub issued_at: DateTime<Utc>,
}

fn serialize_action<S: serde::Serializer>(action: &TaskAction, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(action.as_str())
}

/// Server acknowledgement of a `create`.
///
/// The task itself only enters the registry once a poll reports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedTask {
    pub task_id: Option<String>,
    pub response: serde_json::Value,
}
