use std::sync::Arc;

use anyhow::Result;
use taskpulse_core::api::{AppConfig, BackendConfig, JobBackend, TaskBackend};

use crate::http::HttpClient;
use crate::service::{HttpJobBackend, HttpTaskBackend};

pub fn build_client(cfg: &BackendConfig) -> Result<HttpClient> {
    if !(cfg.base_url.starts_with("http://") || cfg.base_url.starts_with("https://")) {
        anyhow::bail!("backend.base_url must be an http(s) URL, got {:?}", cfg.base_url);
    }
    HttpClient::new(&cfg.base_url, &cfg.api_key, cfg.timeout_ms)
}

pub fn build_task_backend(cfg: &AppConfig) -> Result<Arc<dyn TaskBackend>> {
    Ok(Arc::new(HttpTaskBackend::new(build_client(&cfg.backend)?)))
}

pub fn build_job_backend(cfg: &AppConfig) -> Result<Arc<dyn JobBackend>> {
    Ok(Arc::new(HttpJobBackend::new(build_client(&cfg.backend)?)))
}
