//! BackendsFactory 实现：从配置构建执行器与调度器适配器，供 CLI 复用。
use async_trait::async_trait;
use taskpulse_core::api::{AppConfig, Backends, BackendsFactory, CliError};

use crate::factory;

#[derive(Default)]
pub struct HttpBackendsFactory;

#[async_trait]
impl BackendsFactory for HttpBackendsFactory {
    async fn build_backends(&self, cfg: &AppConfig) -> Result<Backends, CliError> {
        let tasks = factory::build_task_backend(cfg).map_err(|e| CliError::Config(e.to_string()))?;
        let jobs = factory::build_job_backend(cfg).map_err(|e| CliError::Config(e.to_string()))?;
        tracing::debug!(target: "taskpulse.http", base_url = %cfg.backend.base_url, "backends built");
        Ok(Backends { tasks, jobs })
    }
}
