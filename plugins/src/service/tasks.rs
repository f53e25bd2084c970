//! 任务执行器 HTTP 适配器
use async_trait::async_trait;
use serde_json::Value;
use taskpulse_core::api::{unwrap_list, BackendError, CreateTaskRequest, TaskAction, TaskBackend};

use crate::http::HttpClient;

const TASKS: &str = "/api/tasks";

pub struct HttpTaskBackend {
    client: HttpClient,
}

impl HttpTaskBackend {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskBackend for HttpTaskBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn list_tasks(&self) -> Result<Vec<Value>, BackendError> {
        let body = self.client.get_json(TASKS).await?;
        unwrap_list(body, &["tasks"])
    }

    async fn get_task(&self, id: &str) -> Result<Value, BackendError> {
        Ok(self.client.get_json(&format!("{TASKS}/{id}")).await?)
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Value, BackendError> {
        let resp = self.client.post_json(TASKS, request).await?;
        tracing::debug!(target: "taskpulse.http", kind = %request.kind, "create accepted");
        Ok(resp)
    }

    async fn control_task(&self, id: &str, action: TaskAction) -> Result<(), BackendError> {
        self.client
            .post_empty(&format!("{TASKS}/{id}/{}", action.as_str()))
            .await?;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), BackendError> {
        self.client.delete(&format!("{TASKS}/{id}")).await?;
        Ok(())
    }

    async fn cleanup_tasks(&self, older_than_days: u32) -> Result<u64, BackendError> {
        let body = self
            .client
            .post_query(
                &format!("{TASKS}/cleanup"),
                &[("older_than_days", older_than_days)],
            )
            .await?;
        Ok(deleted_count(&body))
    }
}

fn deleted_count(body: &Value) -> u64 {
    ["deleted", "deleted_count", "count", "removed"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_u64))
        .unwrap_or(0)
}
