use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MalformedRecord;
use crate::task::normalize::{lookup_bool, lookup_id, lookup_str, lookup_time};
use crate::task::TaskKind;

/// A recurring trigger definition. Firing it spawns a task on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub cron_expression: String,
    pub enabled: bool,
    /// Server-computed; stale whenever the job is disabled.
    pub next_run_time: Option<DateTime<Utc>>,
    pub task_kind: TaskKind,
    #[serde(default)]
    pub task_params: BTreeMap<String, Value>,
}

impl ScheduledJob {
    /// Next run time, only when it can be relied on.
    pub fn trusted_next_run(&self) -> Option<DateTime<Utc>> {
        if self.enabled {
            self.next_run_time
        } else {
            None
        }
    }
}

/// Definition sent to the scheduler to register a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScheduledJob {
    pub name: String,
    pub cron_expression: String,
    #[serde(rename = "task_type")]
    pub task_kind: TaskKind,
    #[serde(default)]
    pub task_params: BTreeMap<String, Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

const NAME_KEYS: &[&str] = &["name", "job_name", "title"];
const CRON_KEYS: &[&str] = &["cron_expression", "cronExpression", "cron", "trigger", "schedule"];
const ENABLED_KEYS: &[&str] = &["enabled", "is_active", "active"];
const NEXT_RUN_KEYS: &[&str] = &["next_run_time", "nextRunTime", "next_run", "next_run_at"];
const KIND_KEYS: &[&str] = &["task_type", "task_kind", "taskType", "job_type", "kind"];
const PARAMS_KEYS: &[&str] = &["task_params", "params", "kwargs", "parameters"];

/// Same leniency as task records: only a missing id is fatal.
pub fn normalize_job(raw: &Value) -> Result<ScheduledJob, MalformedRecord> {
    let obj = raw.as_object().ok_or(MalformedRecord::NotAnObject)?;
    let id = lookup_id(obj).ok_or(MalformedRecord::MissingId)?;

    // A paused job commonly reports `next_run_time: null` as its only hint.
    let next_run_time = lookup_time(obj, NEXT_RUN_KEYS);
    let enabled = lookup_bool(obj, ENABLED_KEYS)
        .or_else(|| {
            lookup_str(obj, &["status", "state"])
                .map(|s| !matches!(s.to_ascii_lowercase().as_str(), "paused" | "disabled"))
        })
        .unwrap_or(true);

    let cron_expression = lookup_str(obj, CRON_KEYS).unwrap_or_default().to_string();
    let name = lookup_str(obj, NAME_KEYS)
        .map(str::to_string)
        .unwrap_or_else(|| id.clone());
    let task_kind = lookup_str(obj, KIND_KEYS)
        .map(TaskKind::parse_lenient)
        .unwrap_or_default();
    let task_params = PARAMS_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_object))
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    Ok(ScheduledJob {
        id,
        name,
        cron_expression,
        enabled,
        next_run_time,
        task_kind,
        task_params,
    })
}

pub fn normalize_jobs(raws: &[Value]) -> Vec<ScheduledJob> {
    raws.iter()
        .enumerate()
        .filter_map(|(idx, raw)| match normalize_job(raw) {
            Ok(job) => Some(job),
            Err(e) => {
                tracing::warn!(target: "taskpulse.jobs", index = idx, error = %e, "dropping malformed job record");
                None
            }
        })
        .collect()
}
