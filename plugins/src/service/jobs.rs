use async_trait::async_trait;
use serde_json::Value;
use taskpulse_core::api::{unwrap_list, BackendError, JobBackend, NewScheduledJob};

use crate::http::HttpClient;

const JOBS: &str = "/api/scheduled-jobs";

/// Scheduler service adapter.
pub struct HttpJobBackend {
    client: HttpClient,
}

impl HttpJobBackend {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobBackend for HttpJobBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn list_jobs(&self) -> Result<Vec<Value>, BackendError> {
        let body = self.client.get_json(JOBS).await?;
        unwrap_list(body, &["jobs"])
    }

    async fn create_job(&self, job: &NewScheduledJob) -> Result<Value, BackendError> {
        Ok(self.client.post_json(JOBS, job).await?)
    }

    async fn set_job_enabled(&self, id: &str, enabled: bool) -> Result<(), BackendError> {
        let verb = if enabled { "resume" } else { "pause" };
        self.client
            .post_empty(&format!("{JOBS}/{id}/{verb}"))
            .await?;
        Ok(())
    }

    async fn delete_job(&self, id: &str) -> Result<(), BackendError> {
        self.client.delete(&format!("{JOBS}/{id}")).await?;
        Ok(())
    }
}
