//! 轮询控制器
//!
//! Owns the only timer in the engine. Each tick spawns one fetch of the full
//! task list; results are applied to the registry under the controller lock
//! so ordering, teardown and breaker decisions are atomic with the write.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;

use super::status::{PollMode, PollOrigin, PollOutcome, PollingSnapshot, PollingStatus};
use crate::backend::TaskBackend;
use crate::config::PollingConfig;
use crate::registry::TaskRegistry;
use crate::task::{normalize_batch, Task};

/// Handle onto the poll loop. Clones share the same loop.
#[derive(Clone)]
pub struct PollingController {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn TaskBackend>,
    registry: TaskRegistry,
    config: PollingConfig,
    state: Mutex<ControllerState>,
    status_tx: watch::Sender<PollingStatus>,
}

#[derive(Default)]
struct ControllerState {
    /// Dropping or firing this ends the timer task.
    timer: Option<oneshot::Sender<()>>,
    /// Bumped on every stop; fetches started in an older epoch are discarded.
    epoch: u64,
    last_issued_seq: u64,
    last_applied_seq: u64,
    in_flight: usize,
    consecutive_failures: u32,
    manual: bool,
    circuit_open: bool,
    closed: bool,
    last_batch_running: bool,
    last_success_at: Option<chrono::DateTime<Utc>>,
    last_error: Option<String>,
}

impl ControllerState {
    fn mode(&self) -> PollMode {
        if self.last_batch_running || self.manual {
            PollMode::Active
        } else {
            PollMode::Idle
        }
    }
}

impl PollingController {
    pub fn new(
        backend: Arc<dyn TaskBackend>,
        registry: TaskRegistry,
        config: PollingConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(PollingStatus::Stopped);
        Self {
            inner: Arc::new(Inner {
                backend,
                registry,
                config,
                state: Mutex::new(ControllerState::default()),
                status_tx,
            }),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// Mount: begins ticking with an immediate bootstrap fetch, whether or
    /// not anything is running. No-op if the timer is already running or the
    /// breaker is open.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(&self) {
        let mut st = self.inner.lock();
        if st.closed || st.timer.is_some() || st.circuit_open {
            return;
        }
        tracing::info!(
            target: "taskpulse.poll",
            interval_ms = self.inner.config.task_interval_ms,
            "polling mounted"
        );
        Inner::arm(&self.inner, &mut st);
    }

    /// Explicit start. Keeps polling active even with nothing running and
    /// closes an open breaker.
    pub fn start_polling(&self) {
        let mut st = self.inner.lock();
        if st.closed {
            tracing::warn!(target: "taskpulse.poll", "start_polling after shutdown ignored");
            return;
        }
        st.manual = true;
        if st.circuit_open {
            tracing::info!(
                target: "taskpulse.poll",
                failures = st.consecutive_failures,
                "circuit breaker reset by start_polling"
            );
        }
        st.circuit_open = false;
        st.consecutive_failures = 0;
        if st.timer.is_none() {
            Inner::arm(&self.inner, &mut st);
        } else {
            self.inner.publish(&st);
        }
    }

    /// Stops the timer and discards any fetch still in flight. Idempotent.
    pub fn stop_polling(&self) {
        let mut st = self.inner.lock();
        Inner::disarm(&mut st);
        st.epoch += 1;
        st.manual = false;
        st.circuit_open = false;
        st.consecutive_failures = 0;
        self.inner.status_tx.send_replace(PollingStatus::Stopped);
    }

    /// Teardown: stops polling for good. Later fetch results and start calls
    /// are ignored.
    pub fn shutdown(&self) {
        self.stop_polling();
        let mut st = self.inner.lock();
        if !st.closed {
            st.closed = true;
            tracing::debug!(target: "taskpulse.poll", "polling controller shut down");
        }
    }

    /// Out-of-band refresh; counts as an explicit trigger, so it re-arms a
    /// tripped breaker. Does not start a timer that was never mounted.
    pub async fn poll_now(&self) -> PollOutcome {
        {
            let mut st = self.inner.lock();
            if st.closed {
                return PollOutcome::Closed;
            }
            if st.circuit_open {
                tracing::info!(
                    target: "taskpulse.poll",
                    "circuit breaker reset by explicit refresh"
                );
                st.circuit_open = false;
                st.consecutive_failures = 0;
                Inner::arm(&self.inner, &mut st);
            }
        }
        Inner::fetch(Arc::clone(&self.inner), PollOrigin::OutOfBand).await
    }

    /// Runs one timer-style fetch (skipped if one is already in flight).
    pub async fn tick(&self) -> PollOutcome {
        Inner::fetch(Arc::clone(&self.inner), PollOrigin::Tick).await
    }

    /// Drops a task the server confirmed deleted. Every fetch issued before
    /// this call becomes stale, so pre-deletion data cannot bring it back.
    pub fn remove_confirmed(&self, id: &str) -> Option<Task> {
        let mut st = self.inner.lock();
        st.last_applied_seq = st.last_applied_seq.max(st.last_issued_seq);
        self.inner.registry.remove(id)
    }

    pub fn active_task(&self) -> Option<Task> {
        self.inner.registry.active_task()
    }

    pub fn status(&self) -> PollingStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PollingStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    pub fn snapshot(&self) -> PollingSnapshot {
        let st = self.inner.lock();
        PollingSnapshot {
            status: self.status(),
            consecutive_failures: st.consecutive_failures,
            last_issued_seq: st.last_issued_seq,
            last_applied_seq: st.last_applied_seq,
            in_flight: st.in_flight,
            manual: st.manual,
            timer_running: st.timer.is_some(),
            last_success_at: st.last_success_at,
            last_error: st.last_error.clone(),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, st: &ControllerState) {
        let status = if st.circuit_open {
            PollingStatus::CircuitOpen {
                failures: st.consecutive_failures,
                last_error: st.last_error.clone().unwrap_or_default(),
            }
        } else if st.timer.is_some() {
            PollingStatus::Polling { mode: st.mode() }
        } else {
            PollingStatus::Stopped
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn disarm(st: &mut ControllerState) {
        if let Some(stop) = st.timer.take() {
            let _ = stop.send(());
        }
    }

    /// Spawns the interval task. The first tick fires immediately.
    fn arm(this: &Arc<Self>, st: &mut ControllerState) {
        Self::disarm(st);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        st.timer = Some(stop_tx);
        this.publish(st);

        let weak: Weak<Self> = Arc::downgrade(this);
        let period = this.config.task_interval();
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
                // Ticks never wait on a fetch; an overlapping tick is skipped
                // inside `fetch`.
                tokio::spawn(Self::fetch(inner, PollOrigin::Tick));
            }
            tracing::debug!(target: "taskpulse.poll", "poll timer exited");
        });
    }

    async fn fetch(this: Arc<Self>, origin: PollOrigin) -> PollOutcome {
        let (seq, epoch) = {
            let mut st = this.lock();
            if st.closed {
                return PollOutcome::Closed;
            }
            if origin == PollOrigin::Tick && st.circuit_open {
                tracing::trace!(target: "taskpulse.poll", "tick skipped, circuit open");
                return PollOutcome::Skipped;
            }
            if origin == PollOrigin::Tick && st.in_flight > 0 {
                tracing::trace!(
                    target: "taskpulse.poll",
                    in_flight = st.in_flight,
                    "tick skipped, fetch still pending"
                );
                return PollOutcome::Skipped;
            }
            st.in_flight += 1;
            st.last_issued_seq += 1;
            (st.last_issued_seq, st.epoch)
        };
        let mut flight = InFlight {
            inner: this.as_ref(),
            done: false,
        };

        tracing::trace!(target: "taskpulse.poll", seq, ?origin, "fetch issued");
        let result = this.backend.list_tasks().await;

        let mut st = this.lock();
        st.in_flight = st.in_flight.saturating_sub(1);
        flight.done = true;

        if st.closed || st.epoch != epoch {
            tracing::debug!(target: "taskpulse.poll", seq, "discarding fetch result after stop");
            return PollOutcome::Discarded { seq };
        }

        match result {
            Ok(raws) => {
                st.consecutive_failures = 0;
                st.last_success_at = Some(Utc::now());
                st.last_error = None;
                if seq <= st.last_applied_seq {
                    tracing::debug!(
                        target: "taskpulse.poll",
                        seq,
                        last_applied = st.last_applied_seq,
                        "discarding out-of-order fetch result"
                    );
                    return PollOutcome::Stale { seq };
                }
                st.last_applied_seq = seq;

                let tasks = normalize_batch(&raws);
                st.last_batch_running = tasks.iter().any(Task::is_running);
                let task_count = tasks.len();
                let version = this.registry.replace_all(tasks);
                this.publish(&st);

                if st.mode() == PollMode::Active {
                    tracing::debug!(target: "taskpulse.poll", seq, version, task_count, "poll applied");
                } else {
                    tracing::trace!(target: "taskpulse.poll", seq, version, task_count, "idle poll applied");
                }
                PollOutcome::Applied {
                    seq,
                    version,
                    task_count,
                }
            }
            Err(error) => {
                // A newer fetch already succeeded; this failure says nothing
                // about the backend's current health.
                if seq <= st.last_applied_seq {
                    tracing::debug!(
                        target: "taskpulse.poll",
                        seq,
                        last_applied = st.last_applied_seq,
                        error = %error,
                        "ignoring failure of superseded fetch"
                    );
                    return PollOutcome::Stale { seq };
                }
                st.consecutive_failures += 1;
                st.last_error = Some(error.to_string());
                let failures = st.consecutive_failures;
                let threshold = this.config.failure_threshold;

                if failures >= threshold && !st.circuit_open {
                    st.circuit_open = true;
                    Self::disarm(&mut st);
                    this.publish(&st);
                    tracing::error!(
                        target: "taskpulse.poll",
                        failures,
                        error = %error,
                        "polling stopped after consecutive failures; explicit restart required"
                    );
                    return PollOutcome::CircuitOpened {
                        seq,
                        failures,
                        error,
                    };
                }

                if error.is_transient() {
                    tracing::warn!(target: "taskpulse.poll", seq, failures, threshold, error = %error, "poll failed");
                } else {
                    tracing::error!(target: "taskpulse.poll", seq, failures, threshold, error = %error, "poll rejected");
                }
                PollOutcome::Failed {
                    seq,
                    consecutive_failures: failures,
                    error,
                }
            }
        }
    }
}

/// Releases the in-flight slot if a fetch future is dropped mid-request.
struct InFlight<'a> {
    inner: &'a Inner,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            let mut st = self.inner.lock();
            st.in_flight = st.in_flight.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CreateTaskRequest;
    use crate::error::BackendError;
    use crate::task::TaskAction;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Pops scripted responses; repeats the last one when the script runs out.
    struct Scripted {
        script: Mutex<VecDeque<Result<Vec<Value>, BackendError>>>,
        last: Mutex<Option<Result<Vec<Value>, BackendError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(script: Vec<Result<Vec<Value>, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn list_tasks(&self) -> Result<Vec<Value>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(r) => {
                    *self.last.lock().unwrap() = Some(r.clone());
                    r
                }
                None => self.last.lock().unwrap().clone().unwrap_or(Ok(vec![])),
            }
        }

        async fn get_task(&self, id: &str) -> Result<Value, BackendError> {
            Err(BackendError::NotFound(id.to_string()))
        }

        async fn create_task(&self, _: &CreateTaskRequest) -> Result<Value, BackendError> {
            unreachable!()
        }

        async fn control_task(&self, _: &str, _: TaskAction) -> Result<(), BackendError> {
            unreachable!()
        }

        async fn delete_task(&self, _: &str) -> Result<(), BackendError> {
            unreachable!()
        }

        async fn cleanup_tasks(&self, _: u32) -> Result<u64, BackendError> {
            unreachable!()
        }
    }

    fn down() -> Result<Vec<Value>, BackendError> {
        Err(BackendError::Transport("connection refused".into()))
    }

    fn running() -> Result<Vec<Value>, BackendError> {
        Ok(vec![json!({"id": "t1", "status": "running", "total": 10, "current_index": 3})])
    }

    fn controller(backend: Arc<Scripted>) -> PollingController {
        PollingController::new(backend, TaskRegistry::new(), PollingConfig::default())
    }

    #[tokio::test]
    async fn test_success_applies_batch() {
        let backend = Scripted::new(vec![running()]);
        let ctl = controller(backend.clone());
        let outcome = ctl.poll_now().await;
        assert!(outcome.is_applied());
        assert_eq!(ctl.active_task().unwrap().id, "t1");
        assert_eq!(ctl.snapshot().last_applied_seq, 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let backend = Scripted::new(vec![down(), down(), down(), down(), running(), down()]);
        let ctl = controller(backend.clone());
        for _ in 0..4 {
            ctl.tick().await;
        }
        assert_eq!(ctl.snapshot().consecutive_failures, 4);
        assert!(ctl.tick().await.is_applied());
        assert_eq!(ctl.snapshot().consecutive_failures, 0);
        assert!(matches!(
            ctl.tick().await,
            PollOutcome::Failed {
                consecutive_failures: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fifth_failure_opens_circuit() {
        let backend = Scripted::new(vec![down()]);
        let ctl = controller(backend.clone());
        for i in 1..5 {
            assert!(matches!(ctl.tick().await, PollOutcome::Failed { consecutive_failures, .. } if consecutive_failures == i));
        }
        assert!(matches!(
            ctl.tick().await,
            PollOutcome::CircuitOpened { failures: 5, .. }
        ));
        assert!(ctl.status().is_circuit_open());
    }

    #[tokio::test]
    async fn test_unrecognized_list_body_keeps_registry() {
        let garbage = crate::task::unwrap_list(json!({"error": "db locked"}), &["tasks"]);
        let backend = Scripted::new(vec![running(), garbage]);
        let ctl = controller(backend);
        assert!(ctl.poll_now().await.is_applied());
        assert!(matches!(
            ctl.poll_now().await,
            PollOutcome::Failed {
                consecutive_failures: 1,
                ..
            }
        ));
        assert_eq!(ctl.registry().len(), 1);
        assert_eq!(ctl.active_task().unwrap().id, "t1");
    }

    #[tokio::test]
    async fn test_tick_after_trip_does_not_fetch() {
        let backend = Scripted::new(vec![down()]);
        let ctl = controller(backend.clone());
        for _ in 0..5 {
            ctl.tick().await;
        }
        assert_eq!(backend.calls(), 5);

        assert!(matches!(ctl.tick().await, PollOutcome::Skipped));
        assert!(matches!(ctl.tick().await, PollOutcome::Skipped));
        assert_eq!(backend.calls(), 5);
        assert_eq!(ctl.snapshot().consecutive_failures, 5);

        ctl.start_polling();
        ctl.tick().await;
        assert_eq!(backend.calls(), 6);
        ctl.shutdown();
    }

    #[tokio::test]
    async fn test_stop_polling_is_idempotent() {
        let backend = Scripted::new(vec![running()]);
        let ctl = controller(backend);
        ctl.start();
        ctl.stop_polling();
        ctl.stop_polling();
        assert_eq!(ctl.status(), PollingStatus::Stopped);
        assert!(!ctl.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_fetches() {
        let backend = Scripted::new(vec![running()]);
        let ctl = controller(backend.clone());
        ctl.shutdown();
        ctl.shutdown();
        assert!(matches!(ctl.poll_now().await, PollOutcome::Closed));
        ctl.start_polling();
        assert!(!ctl.is_running());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_bootstraps_immediately() {
        let backend = Scripted::new(vec![Ok(vec![])]);
        let ctl = controller(backend.clone());
        ctl.start();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(backend.calls(), 1);
        assert_eq!(
            ctl.status(),
            PollingStatus::Polling {
                mode: PollMode::Idle
            }
        );

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(backend.calls(), 2);
        ctl.shutdown();
    }

    #[tokio::test]
    async fn test_mode_follows_running_tasks_and_manual_start() {
        let backend = Scripted::new(vec![Ok(vec![]), running()]);
        let ctl = controller(backend);
        ctl.start();
        ctl.tick().await;
        assert_eq!(
            ctl.status(),
            PollingStatus::Polling {
                mode: PollMode::Idle
            }
        );
        ctl.tick().await;
        assert_eq!(
            ctl.status(),
            PollingStatus::Polling {
                mode: PollMode::Active
            }
        );
        ctl.shutdown();
    }
}
