use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use taskpulse_core::api::{normalize_task, progress_view, Tone};

#[test]
fn sizing_task_reads_as_initializing() {
    let task = normalize_task(&json!({"id": "t1", "status": "running", "total": 0})).unwrap();
    let view = progress_view(&task, Utc::now());
    assert_eq!(view.percent, 0);
    assert!(view.is_initializing);
    assert_eq!(view.label, "initializing");
    assert!(view.throughput_per_min.is_none());
}

#[test]
fn all_units_done_but_still_running() {
    let task = normalize_task(&json!({
        "id": "t1",
        "status": "running",
        "total": 100,
        "current_index": 100
    }))
    .unwrap();
    let view = progress_view(&task, Utc::now());
    assert_eq!(view.percent, 100);
    assert!(view.is_complete_but_running);
    assert!(!view.is_initializing);
}

#[test]
fn mid_run_rate_and_eta() {
    let started = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 10, 0).unwrap();
    let task = normalize_task(&json!({
        "id": "t1",
        "status": "running",
        "total": 1000,
        "current_index": 250,
        "failed_count": 5,
        "started_at": started.to_rfc3339(),
    }))
    .unwrap();
    let view = progress_view(&task, now);
    assert_eq!(view.percent, 25);
    assert_eq!(view.throughput_per_min, Some(25.0));
    assert_eq!(view.eta.map(|d| d.as_secs()), Some(30 * 60));
    assert_eq!(view.tone, Tone::Info);
}

#[test]
fn clock_skew_never_yields_negative_duration() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let task = normalize_task(&json!({
        "id": "t1",
        "status": "running",
        "total": 10,
        "current_index": 2,
        "started_at": "2024-05-01T09:05:00Z",
    }))
    .unwrap();
    let view = progress_view(&task, now);
    assert_eq!(view.duration.map(|d| d.as_secs()), Some(0));
    assert!(view.throughput_per_min.is_none());
}
