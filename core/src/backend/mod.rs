//! Seams between the engine and the task executor / scheduler services.
//!
//! Implementations return raw JSON records; shaping them is the
//! normalizer's job so every backend gets the same leniency.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;
use crate::jobs::NewScheduledJob;
use crate::task::{TaskAction, TaskKind};

/// Request parameters for creating a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "task_type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl CreateTaskRequest {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

#[async_trait]
pub trait TaskBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Full task list, one raw record per task.
    async fn list_tasks(&self) -> Result<Vec<Value>, BackendError>;

    async fn get_task(&self, id: &str) -> Result<Value, BackendError>;

    /// Returns the creation response. A slot collision must be reported as
    /// [`BackendError::Conflict`].
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Value, BackendError>;

    async fn control_task(&self, id: &str, action: TaskAction) -> Result<(), BackendError>;

    async fn delete_task(&self, id: &str) -> Result<(), BackendError>;

    /// Deletes terminal tasks older than `older_than_days`; returns how many
    /// the server removed.
    async fn cleanup_tasks(&self, older_than_days: u32) -> Result<u64, BackendError>;
}

#[async_trait]
pub trait JobBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn list_jobs(&self) -> Result<Vec<Value>, BackendError>;

    async fn create_job(&self, job: &NewScheduledJob) -> Result<Value, BackendError>;

    async fn set_job_enabled(&self, id: &str, enabled: bool) -> Result<(), BackendError>;

    async fn delete_job(&self, id: &str) -> Result<(), BackendError>;
}
