//! 命令分发器
//!
//! Commands are requests, not transitions: a successful `pause` does not set
//! the task to `paused` locally. The only optimistic mutation is removing a
//! task after the server confirmed its deletion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;

use super::command::{CommandKind, CreatedTask, PendingCommand};
use crate::backend::{CreateTaskRequest, TaskBackend};
use crate::error::{BackendError, CommandError};
use crate::poller::{PollOutcome, PollingController};
use crate::registry::TaskRegistry;
use crate::task::{normalize::lookup_id, normalize_task, Task, TaskAction, TaskTransition};

#[derive(Clone)]
pub struct CommandDispatcher {
    backend: Arc<dyn TaskBackend>,
    poller: PollingController,
    pending: Arc<Mutex<HashMap<String, PendingCommand>>>,
}

impl CommandDispatcher {
    pub fn new(backend: Arc<dyn TaskBackend>, poller: PollingController) -> Self {
        Self {
            backend,
            poller,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn poller(&self) -> &PollingController {
        &self.poller
    }

    fn registry(&self) -> &TaskRegistry {
        self.poller.registry()
    }

    #[tracing::instrument(name = "command.create", skip(self, request), fields(kind = %request.kind))]
    pub async fn create(&self, request: CreateTaskRequest) -> Result<CreatedTask, CommandError> {
        let response = self
            .backend
            .create_task(&request)
            .await
            .map_err(|e| self.reject(CommandKind::Create, None, e))?;

        let task_id = response
            .as_object()
            .and_then(lookup_id)
            .or_else(|| {
                response
                    .get("task")
                    .and_then(Value::as_object)
                    .and_then(lookup_id)
            });
        tracing::info!(
            target: "taskpulse.command",
            task_id = ?task_id,
            "task created"
        );

        self.resync(CommandKind::Create).await;
        Ok(CreatedTask { task_id, response })
    }

    pub async fn pause(&self, id: &str) -> Result<(), CommandError> {
        self.control(id, TaskAction::Pause).await
    }

    pub async fn resume(&self, id: &str) -> Result<(), CommandError> {
        self.control(id, TaskAction::Resume).await
    }

    pub async fn stop(&self, id: &str) -> Result<(), CommandError> {
        self.control(id, TaskAction::Stop).await
    }

    #[tracing::instrument(name = "command.control", skip(self, action), fields(action = %action))]
    async fn control(&self, id: &str, action: TaskAction) -> Result<(), CommandError> {
        let command = CommandKind::from(action);
        self.backend
            .control_task(id, action)
            .await
            .map_err(|e| self.reject(command, Some(id), e))?;

        tracing::info!(target: "taskpulse.command", task_id = %id, %action, "command accepted");
        self.pending_map().insert(
            id.to_string(),
            PendingCommand {
                action,
                expected: TaskTransition::expected_after(action),
                issued_at: Utc::now(),
            },
        );
        self.resync(command).await;
        Ok(())
    }

    /// Deletes on the server, then drops the task locally.
    pub async fn delete(&self, id: &str) -> Result<(), CommandError> {
        self.backend
            .delete_task(id)
            .await
            .map_err(|e| self.reject(CommandKind::Delete, Some(id), e))?;

        tracing::info!(target: "taskpulse.command", task_id = %id, "task deleted");
        self.poller.remove_confirmed(id);
        self.pending_map().remove(id);
        self.resync(CommandKind::Delete).await;
        Ok(())
    }

    /// Removes terminal tasks older than `older_than_days`; returns the count
    /// the server reported.
    pub async fn cleanup(&self, older_than_days: u32) -> Result<u64, CommandError> {
        let removed = self
            .backend
            .cleanup_tasks(older_than_days)
            .await
            .map_err(|e| self.reject(CommandKind::Cleanup, None, e))?;

        tracing::info!(
            target: "taskpulse.command",
            older_than_days,
            removed,
            "cleanup finished"
        );
        self.resync(CommandKind::Cleanup).await;
        Ok(removed)
    }

    /// Fetches one task's detail. Read-only: the registry changes only on polls.
    pub async fn inspect(&self, id: &str) -> Result<Task, CommandError> {
        let raw = self
            .backend
            .get_task(id)
            .await
            .map_err(|e| self.reject(CommandKind::Inspect, Some(id), e))?;
        let raw = match raw.get("task") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => raw,
        };
        normalize_task(&raw).map_err(|e| CommandError::Failed {
            command: CommandKind::Inspect,
            source: BackendError::Decode(e.to_string()),
        })
    }

    /// The accepted command still waiting for a poll to confirm it.
    ///
    /// Cleared once the registry shows the expected status, any terminal
    /// status, or no longer knows the task.
    pub fn pending_command(&self, id: &str) -> Option<PendingCommand> {
        let current = self.registry().get(id);
        let mut pending = self.pending_map();
        let cmd = pending.get(id)?.clone();
        let confirmed = match current {
            None => true,
            Some(task) => task.status == cmd.expected || task.is_terminal(),
        };
        if confirmed {
            pending.remove(id);
            None
        } else {
            Some(cmd)
        }
    }

    async fn resync(&self, command: CommandKind) {
        match self.poller.poll_now().await {
            PollOutcome::Applied { version, .. } => {
                tracing::debug!(target: "taskpulse.command", %command, version, "resynced after command");
            }
            other => {
                tracing::debug!(target: "taskpulse.command", %command, outcome = ?other, "resync after command not applied");
            }
        }
    }

    fn reject(&self, command: CommandKind, id: Option<&str>, err: BackendError) -> CommandError {
        let err = CommandError::from_backend(command, err);
        match &err {
            CommandError::Conflict(conflict) => tracing::warn!(
                target: "taskpulse.command",
                %command,
                existing_task = %conflict.task_id,
                existing_status = %conflict.status,
                "task already exists"
            ),
            CommandError::Failed { source, .. } => tracing::warn!(
                target: "taskpulse.command",
                %command,
                task_id = ?id,
                error = %source,
                "command rejected"
            ),
        }
        err
    }

    fn pending_map(&self) -> MutexGuard<'_, HashMap<String, PendingCommand>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
