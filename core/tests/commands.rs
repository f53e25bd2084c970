mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use taskpulse_core::api::{
    CommandDispatcher, CommandError, CommandKind, CreateTaskRequest, PollOutcome, TaskAction,
    TaskKind, TaskStatus,
};

use common::{controller, task, FakeExecutor};

fn dispatcher(backend: std::sync::Arc<FakeExecutor>) -> CommandDispatcher {
    CommandDispatcher::new(backend.clone(), controller(backend))
}

#[tokio::test]
async fn create_conflict_is_structured_and_registry_untouched() {
    let backend = FakeExecutor::with_tasks(vec![task("t0", "paused", 100, 40)]);
    *backend.conflict.lock().unwrap() = Some(json!({
        "message": "a data update is already in progress",
        "existing_task": {"id": "t0", "status": "paused", "progress": 40}
    }));
    let dispatcher = dispatcher(backend.clone());
    let registry = dispatcher_registry(&dispatcher);
    let before = registry.version();

    let err = dispatcher
        .create(CreateTaskRequest::new(TaskKind::DataUpdate))
        .await
        .unwrap_err();

    let conflict = err.conflict().expect("structured conflict");
    assert_eq!(conflict.task_id, "t0");
    assert_eq!(conflict.status, TaskStatus::Paused);
    assert_eq!(conflict.progress, Some(40));
    assert_eq!(registry.version(), before);
    assert_eq!(backend.list_calls(), 0, "rejected create must not resync");
}

#[tokio::test]
async fn create_resyncs_and_task_arrives_via_poll() {
    let backend = FakeExecutor::new();
    let dispatcher = dispatcher(backend.clone());
    let created = dispatcher
        .create(CreateTaskRequest::new(TaskKind::Screen))
        .await
        .unwrap();
    assert_eq!(created.task_id.as_deref(), Some("t1"));
    assert_eq!(backend.list_calls(), 1);

    let registry = dispatcher_registry(&dispatcher);
    let t1 = registry.get("t1").unwrap();
    assert_eq!(t1.status, TaskStatus::Pending);
    assert_eq!(t1.kind, TaskKind::Screen);
}

#[tokio::test]
async fn pause_is_pending_until_poll_confirms() {
    let backend = FakeExecutor::with_tasks(vec![task("t1", "running", 100, 30)]);
    let dispatcher = dispatcher(backend.clone());

    dispatcher.pause("t1").await.unwrap();
    assert_eq!(
        backend.controls.lock().unwrap().as_slice(),
        &[("t1".to_string(), TaskAction::Pause)]
    );

    // Server has not applied it yet: still running locally, command pending.
    let registry = dispatcher_registry(&dispatcher);
    assert_eq!(registry.get("t1").unwrap().status, TaskStatus::Running);
    let pending = dispatcher.pending_command("t1").unwrap();
    assert_eq!(pending.action, TaskAction::Pause);
    assert_eq!(pending.expected, TaskStatus::Paused);

    backend.set_tasks(vec![task("t1", "paused", 100, 31)]);
    dispatcher_poller(&dispatcher).poll_now().await;
    assert!(dispatcher.pending_command("t1").is_none());
    assert_eq!(registry.get("t1").unwrap().status, TaskStatus::Paused);
}

#[tokio::test]
async fn control_on_finished_task_is_rejected() {
    let backend = FakeExecutor::with_tasks(vec![task("t1", "completed", 10, 10)]);
    let dispatcher = dispatcher(backend.clone());
    let err = dispatcher.stop("t1").await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::Failed {
            command: CommandKind::Stop,
            ..
        }
    ));
    assert!(dispatcher.pending_command("t1").is_none());
}

#[tokio::test]
async fn delete_removes_locally_after_confirmation() {
    let backend = FakeExecutor::with_tasks(vec![
        task("t1", "completed", 10, 10),
        task("t2", "running", 10, 2),
    ]);
    let dispatcher = dispatcher(backend.clone());
    dispatcher_poller(&dispatcher).poll_now().await;
    let registry = dispatcher_registry(&dispatcher);
    assert_eq!(registry.len(), 2);

    dispatcher.delete("t1").await.unwrap();
    assert!(registry.get("t1").is_none());
    assert_eq!(registry.len(), 1);

    let err = dispatcher.delete("missing").await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::Failed {
            command: CommandKind::Delete,
            ..
        }
    ));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn confirmed_delete_outlives_older_list_fetch() {
    let backend = FakeExecutor::with_tasks(vec![
        task("t1", "completed", 10, 10),
        task("t2", "running", 10, 2),
    ]);
    let dispatcher = dispatcher(backend.clone());
    let poller = dispatcher_poller(&dispatcher);
    poller.poll_now().await;
    let registry = dispatcher_registry(&dispatcher);

    // A tick fetch issued before the delete, still waiting on the server.
    let gate = backend.hold_next_list();
    let old_fetch = tokio::spawn({
        let poller = poller.clone();
        async move { poller.tick().await }
    });
    backend.wait_for_list_calls(2).await;

    // Delete succeeds but the follow-up resync fails.
    backend.set_down(true);
    dispatcher.delete("t1").await.unwrap();
    assert_eq!(backend.list_calls(), 3);
    assert!(registry.get("t1").is_none());

    gate.send(Ok(vec![
        task("t1", "completed", 10, 10),
        task("t2", "running", 10, 2),
    ]))
    .unwrap();
    assert!(matches!(
        old_fetch.await.unwrap(),
        PollOutcome::Stale { seq: 2 }
    ));
    assert!(registry.get("t1").is_none());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn cleanup_reports_count_and_resyncs() {
    let backend = FakeExecutor::with_tasks(vec![
        task("t1", "completed", 10, 10),
        task("t2", "failed", 10, 3),
        task("t3", "running", 10, 2),
    ]);
    let dispatcher = dispatcher(backend.clone());
    assert_eq!(dispatcher.cleanup(7).await.unwrap(), 2);
    let registry = dispatcher_registry(&dispatcher);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.active_task().unwrap().id, "t3");
}

#[tokio::test]
async fn inspect_does_not_touch_registry() {
    let backend = FakeExecutor::with_tasks(vec![task("t1", "running", 100, 30)]);
    let dispatcher = dispatcher(backend.clone());
    let task = dispatcher.inspect("t1").await.unwrap();
    assert_eq!(task.processed, 30);
    assert!(dispatcher_registry(&dispatcher).is_empty());
    assert_eq!(backend.list_calls(), 0);
}

fn dispatcher_registry(dispatcher: &CommandDispatcher) -> taskpulse_core::api::TaskRegistry {
    dispatcher.poller().registry().clone()
}

fn dispatcher_poller(dispatcher: &CommandDispatcher) -> taskpulse_core::api::PollingController {
    dispatcher.poller().clone()
}
