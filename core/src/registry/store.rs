//! 任务注册表实现

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::events::RegistryEvent;
use crate::task::{Observation, Task, TaskKind, TaskStatus, TaskTransition};

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Consistent copy of the registry at one version.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrySnapshot {
    pub version: u64,
    pub tasks: Vec<Task>,
    pub active_task_id: Option<String>,
}

/// In-memory store of every known task.
///
/// Cloning yields another handle onto the same store.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    state: RwLock<RegistryState>,
    event_tx: broadcast::Sender<RegistryEvent>,
}

#[derive(Default)]
struct RegistryState {
    /// Server order is preserved.
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    active: Option<usize>,
    version: u64,
    /// Terminal records that were later contradicted by the server.
    history: Vec<Task>,
}

impl RegistryState {
    fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    fn reindex(&mut self) {
        self.index = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        self.active = select_active(&self.tasks);
    }

    fn active_id(&self) -> Option<String> {
        self.active.map(|i| self.tasks[i].id.clone())
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// `capacity` bounds the broadcast buffer; slow subscribers lag rather
    /// than block writers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                event_tx,
            }),
        }
    }

    /// 订阅注册表事件
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Replaces the whole collection with a freshly polled batch.
    ///
    /// Returns the new version. Readers see either the old batch or the new
    /// one, never a mix.
    pub fn replace_all(&self, tasks: Vec<Task>) -> u64 {
        self.replace_all_at(tasks, Utc::now())
    }

    /// [`Self::replace_all`] with an explicit observation time.
    pub fn replace_all_at(&self, tasks: Vec<Task>, observed_at: DateTime<Utc>) -> u64 {
        let mut events = Vec::new();
        let (version, task_count, active_task_id) = {
            let mut state = self.write();
            let mut next: Vec<Task> = Vec::with_capacity(tasks.len());
            let mut seen: HashMap<String, usize> = HashMap::with_capacity(tasks.len());
            let mut archived = Vec::new();

            for mut task in tasks {
                let prev = state.get(&task.id);
                let mut inherit = prev;

                if let Some(prev) = prev {
                    match TaskTransition::observe(prev.status, task.status) {
                        Observation::Unchanged => {}
                        Observation::TerminalViolation => {
                            tracing::warn!(
                                target: "taskpulse.registry",
                                task_id = %task.id,
                                from = %prev.status,
                                to = %task.status,
                                "terminal task reported a new status; archiving previous record"
                            );
                            archived.push(prev.clone());
                            inherit = None;
                            events.push(RegistryEvent::TerminalViolation {
                                task_id: task.id.clone(),
                                from: prev.status,
                                to: task.status,
                            });
                        }
                        obs => {
                            if obs == Observation::Regression {
                                tracing::debug!(
                                    target: "taskpulse.registry",
                                    task_id = %task.id,
                                    from = %prev.status,
                                    to = %task.status,
                                    "task status moved backwards"
                                );
                            }
                            events.push(RegistryEvent::StatusChanged {
                                task_id: task.id.clone(),
                                from: prev.status,
                                to: task.status,
                            });
                        }
                    }
                }

                stamp_times(&mut task, inherit, observed_at);

                if let Some(&pos) = seen.get(&task.id) {
                    tracing::warn!(
                        target: "taskpulse.registry",
                        task_id = %task.id,
                        "duplicate task id in batch; keeping the later record"
                    );
                    next[pos] = task;
                } else {
                    seen.insert(task.id.clone(), next.len());
                    next.push(task);
                }
            }

            state.history.extend(archived);
            state.tasks = next;
            state.reindex();
            state.version += 1;
            (state.version, state.tasks.len(), state.active_id())
        };

        tracing::debug!(
            target: "taskpulse.registry",
            version,
            task_count,
            active_task_id = ?active_task_id,
            "registry replaced"
        );

        for event in events {
            self.emit(event);
        }
        self.emit(RegistryEvent::Replaced {
            version,
            task_count,
            active_task_id,
        });
        version
    }

    /// Drops a task after the server confirmed its deletion.
    pub fn remove(&self, id: &str) -> Option<Task> {
        let (removed, version) = {
            let mut state = self.write();
            let pos = *state.index.get(id)?;
            let removed = state.tasks.remove(pos);
            state.reindex();
            state.version += 1;
            (removed, state.version)
        };
        tracing::debug!(target: "taskpulse.registry", task_id = %id, version, "task removed");
        self.emit(RegistryEvent::Removed {
            version,
            task_id: id.to_string(),
        });
        Some(removed)
    }

    /// The running task the UI should feature, if any.
    pub fn active_task(&self) -> Option<Task> {
        let state = self.read();
        state.active.map(|i| state.tasks[i].clone())
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.read().get(id).cloned()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.read().tasks.clone()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.read();
        RegistrySnapshot {
            version: state.version,
            tasks: state.tasks.clone(),
            active_task_id: state.active_id(),
        }
    }

    pub fn by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.read()
            .tasks
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    pub fn by_kind(&self, kind: &TaskKind) -> Vec<Task> {
        self.read()
            .tasks
            .iter()
            .filter(|t| &t.kind == kind)
            .cloned()
            .collect()
    }

    pub fn has_running(&self) -> bool {
        self.read().tasks.iter().any(Task::is_running)
    }

    /// Terminal records superseded by a later, contradicting poll.
    pub fn history(&self) -> Vec<Task> {
        self.read().history.clone()
    }

    pub fn version(&self) -> u64 {
        self.read().version
    }

    pub fn len(&self) -> usize {
        self.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().tasks.is_empty()
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.inner.event_tx.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `started_at` is fixed the first time a task is seen past `pending`;
/// `ended_at` the first time it is seen terminal.
fn stamp_times(task: &mut Task, prev: Option<&Task>, observed_at: DateTime<Utc>) {
    if task.status != TaskStatus::Pending && task.started_at.is_none() {
        task.started_at = prev.and_then(|p| p.started_at).or(Some(observed_at));
    }
    if task.status.is_terminal() {
        if task.ended_at.is_none() {
            task.ended_at = prev
                .filter(|p| p.status == task.status)
                .and_then(|p| p.ended_at)
                .or(Some(observed_at));
        }
    } else {
        task.ended_at = None;
    }
}

/// Most recently started running task; a missing start time loses, and
/// remaining ties keep server order.
fn select_active(tasks: &[Task]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, task) in tasks.iter().enumerate() {
        if !task.is_running() {
            continue;
        }
        match best {
            Some(b) if tasks[b].started_at >= task.started_at => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn task(id: &str, status: TaskStatus, started: Option<i64>) -> Task {
        let mut t = Task::new(id, TaskKind::DataUpdate);
        t.status = status;
        t.started_at = started.map(at);
        t
    }

    #[test]
    fn test_active_is_latest_started_running() {
        let reg = TaskRegistry::new();
        reg.replace_all_at(
            vec![
                task("a", TaskStatus::Running, Some(10)),
                task("b", TaskStatus::Running, Some(50)),
                task("c", TaskStatus::Completed, Some(90)),
                task("d", TaskStatus::Running, Some(20)),
            ],
            at(100),
        );
        assert_eq!(reg.active_task().map(|t| t.id), Some("b".to_string()));
    }

    #[test]
    fn test_active_none_without_running() {
        let reg = TaskRegistry::new();
        reg.replace_all_at(
            vec![
                task("a", TaskStatus::Paused, Some(10)),
                task("b", TaskStatus::Pending, None),
            ],
            at(100),
        );
        assert!(reg.active_task().is_none());
    }

    #[test]
    fn test_active_tie_keeps_server_order() {
        let reg = TaskRegistry::new();
        reg.replace_all_at(
            vec![
                task("first", TaskStatus::Running, Some(10)),
                task("second", TaskStatus::Running, Some(10)),
            ],
            at(100),
        );
        assert_eq!(reg.active_task().unwrap().id, "first");
    }

    #[test]
    fn test_replace_discards_missing_tasks() {
        let reg = TaskRegistry::new();
        reg.replace_all(vec![task("a", TaskStatus::Running, Some(1))]);
        reg.replace_all(vec![task("b", TaskStatus::Pending, None)]);
        assert!(reg.get("a").is_none());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.version(), 2);
    }

    #[test]
    fn test_started_at_stamped_once() {
        let reg = TaskRegistry::new();
        reg.replace_all_at(vec![task("a", TaskStatus::Pending, None)], at(0));
        assert!(reg.get("a").unwrap().started_at.is_none());

        reg.replace_all_at(vec![task("a", TaskStatus::Running, None)], at(10));
        assert_eq!(reg.get("a").unwrap().started_at, Some(at(10)));

        reg.replace_all_at(vec![task("a", TaskStatus::Running, None)], at(20));
        assert_eq!(reg.get("a").unwrap().started_at, Some(at(10)));
    }

    #[test]
    fn test_ended_at_iff_terminal() {
        let reg = TaskRegistry::new();
        reg.replace_all_at(vec![task("a", TaskStatus::Running, Some(0))], at(5));
        assert!(reg.get("a").unwrap().ended_at.is_none());

        reg.replace_all_at(vec![task("a", TaskStatus::Completed, Some(0))], at(30));
        assert_eq!(reg.get("a").unwrap().ended_at, Some(at(30)));

        reg.replace_all_at(vec![task("a", TaskStatus::Completed, Some(0))], at(60));
        assert_eq!(reg.get("a").unwrap().ended_at, Some(at(30)));
    }

    #[test]
    fn test_terminal_violation_archives_history() {
        let reg = TaskRegistry::new();
        let mut rx = reg.subscribe();
        reg.replace_all_at(vec![task("a", TaskStatus::Completed, Some(0))], at(10));
        reg.replace_all_at(vec![task("a", TaskStatus::Running, None)], at(20));

        let history = reg.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TaskStatus::Completed);

        let live = reg.get("a").unwrap();
        assert_eq!(live.status, TaskStatus::Running);
        // Treated as a new task: fresh start time, not inherited.
        assert_eq!(live.started_at, Some(at(20)));

        let mut saw_violation = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, RegistryEvent::TerminalViolation { .. }) {
                saw_violation = true;
            }
        }
        assert!(saw_violation);
    }

    #[test]
    fn test_remove_recomputes_active() {
        let reg = TaskRegistry::new();
        reg.replace_all(vec![
            task("a", TaskStatus::Running, Some(10)),
            task("b", TaskStatus::Running, Some(20)),
        ]);
        assert_eq!(reg.active_task().unwrap().id, "b");
        assert!(reg.remove("b").is_some());
        assert_eq!(reg.active_task().unwrap().id, "a");
        assert!(reg.remove("missing").is_none());
    }

    #[test]
    fn test_duplicate_ids_keep_later() {
        let reg = TaskRegistry::new();
        reg.replace_all(vec![
            task("a", TaskStatus::Pending, None),
            task("a", TaskStatus::Running, Some(1)),
        ]);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("a").unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn test_events_emitted() {
        let reg = TaskRegistry::new();
        let mut rx = reg.subscribe();
        reg.replace_all(vec![task("a", TaskStatus::Pending, None)]);
        reg.replace_all(vec![task("a", TaskStatus::Running, None)]);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(events[0], RegistryEvent::Replaced { version: 1, .. }));
        assert!(matches!(
            events[1],
            RegistryEvent::StatusChanged {
                from: TaskStatus::Pending,
                to: TaskStatus::Running,
                ..
            }
        ));
        assert!(matches!(
            &events[2],
            RegistryEvent::Replaced { version: 2, active_task_id: Some(id), .. } if id == "a"
        ));
    }

    #[test]
    fn test_filters() {
        let reg = TaskRegistry::new();
        let mut screen = task("s", TaskStatus::Running, Some(1));
        screen.kind = TaskKind::Screen;
        reg.replace_all(vec![screen, task("u", TaskStatus::Paused, Some(1))]);
        assert_eq!(reg.by_kind(&TaskKind::Screen).len(), 1);
        assert_eq!(reg.by_status(TaskStatus::Paused)[0].id, "u");
        assert!(reg.has_running());
    }
}
