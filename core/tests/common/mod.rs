#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use taskpulse_core::api::{
    normalize_conflict, BackendError, CreateTaskRequest, PollingConfig, PollingController,
    TaskAction, TaskBackend, TaskRegistry,
};

type ListResult = Result<Vec<Value>, BackendError>;

/// In-memory executor. List calls can be held open with [`FakeExecutor::hold_next_list`]
/// to resolve them in any order.
#[derive(Default)]
pub struct FakeExecutor {
    pub tasks: Mutex<Vec<Value>>,
    gates: Mutex<VecDeque<oneshot::Receiver<ListResult>>>,
    pub down: AtomicBool,
    pub conflict: Mutex<Option<Value>>,
    pub controls: Mutex<Vec<(String, TaskAction)>>,
    list_calls: AtomicUsize,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_tasks(tasks: Vec<Value>) -> Arc<Self> {
        let fake = Self::default();
        *fake.tasks.lock().unwrap() = tasks;
        Arc::new(fake)
    }

    pub fn set_tasks(&self, tasks: Vec<Value>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// The next list call blocks until the returned sender fires.
    pub fn hold_next_list(&self) -> oneshot::Sender<ListResult> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    /// Yields until `n` list calls have reached the fake.
    pub async fn wait_for_list_calls(&self, n: usize) {
        for _ in 0..1000 {
            if self.list_calls() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {n} list calls, saw {}", self.list_calls());
    }
}

#[async_trait]
impl TaskBackend for FakeExecutor {
    fn name(&self) -> &str {
        "fake-executor"
    }

    async fn list_tasks(&self) -> Result<Vec<Value>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            return gate
                .await
                .unwrap_or_else(|_| Err(BackendError::Transport("gate dropped".into())));
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("connection refused".into()));
        }
        Ok(self.tasks.lock().unwrap().clone())
    }

    async fn get_task(&self, id: &str) -> Result<Value, BackendError> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t["id"] == id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(id.to_string()))
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Value, BackendError> {
        if let Some(body) = self.conflict.lock().unwrap().as_ref() {
            return Err(BackendError::Conflict(normalize_conflict(body)));
        }
        let mut tasks = self.tasks.lock().unwrap();
        let id = format!("t{}", tasks.len() + 1);
        tasks.push(json!({
            "id": id,
            "task_type": request.kind.as_str(),
            "status": "pending",
            "total": 0,
        }));
        Ok(json!({"task_id": id, "status": "pending"}))
    }

    async fn control_task(&self, id: &str, action: TaskAction) -> Result<(), BackendError> {
        let tasks = self.tasks.lock().unwrap();
        let Some(task) = tasks.iter().find(|t| t["id"] == id) else {
            return Err(BackendError::NotFound(id.to_string()));
        };
        if matches!(task["status"].as_str(), Some("completed" | "failed" | "stopped")) {
            return Err(BackendError::Status {
                status: 400,
                message: format!("task {id} already finished"),
            });
        }
        self.controls.lock().unwrap().push((id.to_string(), action));
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), BackendError> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| t["id"] != id);
        if tasks.len() == before {
            return Err(BackendError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn cleanup_tasks(&self, _older_than_days: u32) -> Result<u64, BackendError> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| !matches!(t["status"].as_str(), Some("completed" | "failed" | "stopped")));
        Ok((before - tasks.len()) as u64)
    }
}

pub fn task(id: &str, status: &str, total: u64, index: u64) -> Value {
    json!({
        "id": id,
        "task_type": "update",
        "status": status,
        "total": total,
        "current_index": index,
        "started_at": "2024-05-01T09:00:00Z",
    })
}

pub fn fast_config() -> PollingConfig {
    PollingConfig {
        task_interval_ms: 10_000,
        ..PollingConfig::default()
    }
}

pub fn controller(backend: Arc<FakeExecutor>) -> PollingController {
    PollingController::new(backend, TaskRegistry::new(), fast_config())
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
