use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::{JobBackend, TaskBackend};
use crate::config::AppConfig;
use crate::dispatch::CommandDispatcher;
use crate::error::CliError;
use crate::jobs::{JobManager, RefreshHandle};
use crate::poller::PollingController;
use crate::registry::TaskRegistry;

#[derive(Clone)]
pub struct Backends {
    pub tasks: Arc<dyn TaskBackend>,
    pub jobs: Arc<dyn JobBackend>,
}

#[async_trait::async_trait]
pub trait BackendsFactory: Send + Sync {
    async fn build_backends(&self, cfg: &AppConfig) -> Result<Backends, CliError>;
}

/// One wired engine: registry, poll loop, dispatcher and job manager sharing
/// the same backends.
#[derive(Clone)]
pub struct TaskEngine {
    pub registry: TaskRegistry,
    pub poller: PollingController,
    pub dispatcher: CommandDispatcher,
    pub jobs: JobManager,
    job_interval: Duration,
    job_refresh: Arc<Mutex<Option<RefreshHandle>>>,
}

impl TaskEngine {
    pub fn new(cfg: &AppConfig, backends: Backends) -> Self {
        let registry = TaskRegistry::with_capacity(cfg.polling.event_capacity);
        let poller = PollingController::new(
            Arc::clone(&backends.tasks),
            registry.clone(),
            cfg.polling.clone(),
        );
        let dispatcher = CommandDispatcher::new(backends.tasks, poller.clone());
        let jobs = JobManager::new(backends.jobs);
        tracing::debug!(
            target: "taskpulse.poll",
            task_interval_ms = cfg.polling.task_interval_ms,
            job_interval_ms = cfg.polling.job_interval_ms,
            "engine assembled"
        );
        Self {
            registry,
            poller,
            dispatcher,
            jobs,
            job_interval: cfg.polling.job_interval(),
            job_refresh: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts re-listing scheduled jobs every `polling.job_interval_ms`.
    /// No-op while a refresh loop is already running.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start_job_refresh(&self) {
        let mut slot = self.job_refresh.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_stopped()) {
            return;
        }
        tracing::debug!(
            target: "taskpulse.jobs",
            interval_ms = self.job_interval.as_millis() as u64,
            "job refresh started"
        );
        *slot = Some(self.jobs.start_refresh(self.job_interval));
    }

    /// Stops the poll loop and the job refresh for good; later fetch results
    /// are dropped.
    pub fn shutdown(&self) {
        self.poller.shutdown();
        let handle = self
            .job_refresh
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(mut handle) = handle {
            handle.stop();
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    cfg: AppConfig,
    factory: Option<Arc<dyn BackendsFactory>>,
}

impl AppContext {
    pub fn new(cfg: AppConfig, factory: Option<Arc<dyn BackendsFactory>>) -> Result<Self, CliError> {
        cfg.polling.validate().map_err(CliError::Config)?;
        Ok(Self { cfg, factory })
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn with_config(&self, cfg: AppConfig) -> Self {
        Self {
            cfg,
            factory: self.factory.clone(),
        }
    }

    pub async fn build_engine(&self) -> Result<TaskEngine, CliError> {
        let Some(factory) = self.factory.as_ref() else {
            return Err(CliError::Config(
                "backends factory missing (cannot reach executor)".into(),
            ));
        };
        let backends = factory.build_backends(&self.cfg).await?;
        Ok(TaskEngine::new(&self.cfg, backends))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CreateTaskRequest;
    use crate::error::BackendError;
    use crate::jobs::NewScheduledJob;
    use crate::task::TaskAction;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct Empty {
        job_lists: std::sync::atomic::AtomicUsize,
    }

    impl Empty {
        fn job_lists(&self) -> usize {
            self.job_lists.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskBackend for Empty {
        fn name(&self) -> &str {
            "empty"
        }
        async fn list_tasks(&self) -> Result<Vec<Value>, BackendError> {
            Ok(vec![json!({"id": "t1", "status": "running", "total": 4, "current_index": 1})])
        }
        async fn get_task(&self, id: &str) -> Result<Value, BackendError> {
            Err(BackendError::NotFound(id.into()))
        }
        async fn create_task(&self, _: &CreateTaskRequest) -> Result<Value, BackendError> {
            Ok(json!({}))
        }
        async fn control_task(&self, _: &str, _: TaskAction) -> Result<(), BackendError> {
            Ok(())
        }
        async fn delete_task(&self, _: &str) -> Result<(), BackendError> {
            Ok(())
        }
        async fn cleanup_tasks(&self, _: u32) -> Result<u64, BackendError> {
            Ok(0)
        }
    }

    #[async_trait]
    impl JobBackend for Empty {
        fn name(&self) -> &str {
            "empty"
        }
        async fn list_jobs(&self) -> Result<Vec<Value>, BackendError> {
            self.job_lists
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![])
        }
        async fn create_job(&self, _: &NewScheduledJob) -> Result<Value, BackendError> {
            Ok(json!({}))
        }
        async fn set_job_enabled(&self, _: &str, _: bool) -> Result<(), BackendError> {
            Ok(())
        }
        async fn delete_job(&self, _: &str) -> Result<(), BackendError> {
            Ok(())
        }
    }

    struct EmptyFactory;

    #[async_trait]
    impl BackendsFactory for EmptyFactory {
        async fn build_backends(&self, _: &AppConfig) -> Result<Backends, CliError> {
            let backend = Arc::new(Empty::default());
            Ok(Backends {
                tasks: backend.clone(),
                jobs: backend,
            })
        }
    }

    #[test]
    fn test_missing_factory_is_config_error() {
        let ctx = AppContext::new(AppConfig::default(), None).unwrap();
        let err = tokio_test::block_on(ctx.build_engine()).err().unwrap();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_invalid_polling_config_rejected() {
        let mut cfg = AppConfig::default();
        cfg.polling.failure_threshold = 0;
        assert!(matches!(
            AppContext::new(cfg, None).err(),
            Some(CliError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_engine_parts_share_registry() {
        let ctx = AppContext::new(AppConfig::default(), Some(Arc::new(EmptyFactory))).unwrap();
        let engine = ctx.build_engine().await.unwrap();
        assert!(engine.poller.poll_now().await.is_applied());
        assert_eq!(engine.registry.active_task().unwrap().id, "t1");
        assert_eq!(engine.dispatcher.poller().registry().len(), 1);
        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_refresh_follows_config_and_stops_on_shutdown() {
        let backend = Arc::new(Empty::default());
        let mut cfg = AppConfig::default();
        cfg.polling.job_interval_ms = 30_000;
        let engine = TaskEngine::new(
            &cfg,
            Backends {
                tasks: backend.clone(),
                jobs: backend.clone(),
            },
        );

        engine.start_job_refresh();
        engine.start_job_refresh();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(backend.job_lists(), 1);

        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert_eq!(backend.job_lists(), 2);

        engine.shutdown();
        tokio::time::sleep(Duration::from_millis(90_000)).await;
        assert_eq!(backend.job_lists(), 2);
    }
}
