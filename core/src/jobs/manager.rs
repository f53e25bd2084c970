//! 定时任务管理
//!
//! Job definitions live apart from the task registry. Every successful write
//! is followed by a re-list, so the local copy is always a server snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;

use super::model::{normalize_jobs, NewScheduledJob, ScheduledJob};
use crate::backend::JobBackend;
use crate::error::BackendError;

#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn JobBackend>,
    jobs: RwLock<JobsState>,
    issued: AtomicU64,
    /// Sequence of the last applied list.
    applied_tx: watch::Sender<u64>,
}

#[derive(Default)]
struct JobsState {
    applied_seq: u64,
    jobs: Vec<ScheduledJob>,
}

impl JobManager {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                jobs: RwLock::new(JobsState::default()),
                issued: AtomicU64::new(0),
                applied_tx: watch::channel(0).0,
            }),
        }
    }

    /// Cached job list from the last applied refresh.
    pub fn jobs(&self) -> Vec<ScheduledJob> {
        self.inner.read().jobs.clone()
    }

    /// Changes whenever a newer job list is applied.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.applied_tx.subscribe()
    }

    pub fn get(&self, id: &str) -> Option<ScheduledJob> {
        self.inner.read().jobs.iter().find(|j| j.id == id).cloned()
    }

    /// Fetches and replaces the cached list. An older fetch that resolves
    /// after a newer one is dropped.
    pub async fn list(&self) -> Result<Vec<ScheduledJob>, BackendError> {
        Inner::refresh(&self.inner).await
    }

    /// Registers a new trigger. Does not create a task.
    #[tracing::instrument(name = "jobs.create", skip(self, job), fields(name = %job.name))]
    pub async fn create(&self, job: &NewScheduledJob) -> Result<Option<String>, BackendError> {
        let response = self
            .inner
            .backend
            .create_job(job)
            .await
            .inspect_err(|e| tracing::error!(target: "taskpulse.jobs", error = %e, "create job failed"))?;
        let id = response
            .as_object()
            .and_then(crate::task::normalize::lookup_id);
        tracing::info!(target: "taskpulse.jobs", job_id = ?id, cron = %job.cron_expression, "job created");
        self.resync().await;
        Ok(id)
    }

    /// Disables future firings. Tasks already spawned by the job keep running.
    pub async fn pause(&self, id: &str) -> Result<(), BackendError> {
        self.set_enabled(id, false).await
    }

    pub async fn resume(&self, id: &str) -> Result<(), BackendError> {
        self.set_enabled(id, true).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.inner
            .backend
            .delete_job(id)
            .await
            .inspect_err(|e| tracing::error!(target: "taskpulse.jobs", job_id = id, error = %e, "delete job failed"))?;
        tracing::info!(target: "taskpulse.jobs", job_id = id, "job deleted");
        self.resync().await;
        Ok(())
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), BackendError> {
        self.inner
            .backend
            .set_job_enabled(id, enabled)
            .await
            .inspect_err(|e| {
                tracing::error!(target: "taskpulse.jobs", job_id = id, enabled, error = %e, "job toggle failed")
            })?;
        tracing::info!(target: "taskpulse.jobs", job_id = id, enabled, "job toggled");
        self.resync().await;
        Ok(())
    }

    /// The write already succeeded; a failed re-list only leaves the cache
    /// stale until the next refresh.
    async fn resync(&self) {
        if let Err(e) = Inner::refresh(&self.inner).await {
            tracing::warn!(target: "taskpulse.jobs", error = %e, "job re-list failed after write");
        }
    }

    /// Periodic re-list on its own cadence, independent of task polling.
    /// Must be called inside a Tokio runtime.
    pub fn start_refresh(&self, period: Duration) -> RefreshHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else { break };
                if let Err(e) = Inner::refresh(&inner).await {
                    tracing::warn!(target: "taskpulse.jobs", error = %e, "job refresh failed");
                }
            }
            tracing::debug!(target: "taskpulse.jobs", "job refresh loop exited");
        });
        RefreshHandle {
            stop: Some(stop_tx),
        }
    }
}

impl Inner {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, JobsState> {
        self.jobs.read().unwrap_or_else(|p| p.into_inner())
    }

    async fn refresh(this: &Arc<Self>) -> Result<Vec<ScheduledJob>, BackendError> {
        let seq = this.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let raws = this.backend.list_jobs().await?;
        let jobs = normalize_jobs(&raws);

        let mut state = this.jobs.write().unwrap_or_else(|p| p.into_inner());
        if seq > state.applied_seq {
            state.applied_seq = seq;
            state.jobs = jobs.clone();
            drop(state);
            this.applied_tx.send_replace(seq);
            tracing::debug!(target: "taskpulse.jobs", seq, count = jobs.len(), "job list applied");
        } else {
            tracing::debug!(target: "taskpulse.jobs", seq, "discarding out-of-order job list");
        }
        Ok(jobs)
    }
}

/// Stops the refresh loop on [`RefreshHandle::stop`] or drop.
pub struct RefreshHandle {
    stop: Option<oneshot::Sender<()>>,
}

impl RefreshHandle {
    /// Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_none()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
