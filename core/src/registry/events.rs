use serde::Serialize;

use crate::task::TaskStatus;

/// Registry change notifications.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A poll batch was applied.
    Replaced {
        version: u64,
        task_count: usize,
        active_task_id: Option<String>,
    },
    /// A task was removed after a confirmed delete.
    Removed { version: u64, task_id: String },
    /// A known task reported a different status than last time.
    StatusChanged {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    /// A terminal task reported a new status; the old record went to history.
    TerminalViolation {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl RegistryEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Replaced { .. } => None,
            Self::Removed { task_id, .. }
            | Self::StatusChanged { task_id, .. }
            | Self::TerminalViolation { task_id, .. } => Some(task_id),
        }
    }
}
