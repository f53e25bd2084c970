//! Absorbs the variance in executor task records.
//!
//! Every field is looked up under a list of aliases; anything missing or of
//! the wrong type degrades to a safe default so a single bad record never
//! blanks a whole batch.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::model::{ResultSummary, Task, TaskKind, TaskStatus};
use crate::error::{BackendError, MalformedRecord, TaskConflict};

const ID_KEYS: &[&str] = &["id", "task_id", "taskId", "uuid"];
const KIND_KEYS: &[&str] = &["kind", "task_type", "taskType", "type"];
const STATUS_KEYS: &[&str] = &["status", "state"];
const TOTAL_KEYS: &[&str] = &["total", "total_count", "totalCount", "total_stocks", "total_items"];
/// Index-style progress; preferred because executors advance it before any
/// unit has fully succeeded.
const INDEX_KEYS: &[&str] = &["current_index", "currentIndex", "current", "progress_index"];
const PROCESSED_KEYS: &[&str] = &[
    "processed",
    "processed_count",
    "success_count",
    "successCount",
    "completed_count",
    "completed",
];
const FAILED_KEYS: &[&str] = &["failed", "failed_count", "failedCount", "error_count"];
const STARTED_KEYS: &[&str] = &["started_at", "startedAt", "start_time", "startTime"];
const ENDED_KEYS: &[&str] = &[
    "ended_at",
    "endedAt",
    "end_time",
    "endTime",
    "completed_at",
    "finished_at",
];
const PARAMS_KEYS: &[&str] = &["params", "parameters", "task_params", "config"];
const ERROR_KEYS: &[&str] = &["last_error", "error", "error_message", "errorMessage", "message"];
const RESULT_KEYS: &[&str] = &["result_summary", "result", "summary", "results"];
const PERCENT_KEYS: &[&str] = &["progress", "percent", "percentage"];

/// Normalises one raw record.
///
/// Fails only when the record has no identity at all; every other defect is
/// absorbed into defaults.
pub fn normalize_task(raw: &Value) -> Result<Task, MalformedRecord> {
    let obj = raw.as_object().ok_or(MalformedRecord::NotAnObject)?;
    let id = lookup_id(obj).ok_or(MalformedRecord::MissingId)?;

    let kind = lookup_str(obj, KIND_KEYS)
        .map(TaskKind::parse_lenient)
        .unwrap_or_default();

    let status = match lookup_str(obj, STATUS_KEYS) {
        Some(s) => TaskStatus::parse_lenient(s).unwrap_or_else(|| {
            tracing::warn!(
                target: "taskpulse.normalize",
                task_id = %id,
                status = %s,
                "unknown task status, treating as pending"
            );
            TaskStatus::Pending
        }),
        None => TaskStatus::Pending,
    };

    let total = lookup_u64(obj, TOTAL_KEYS).unwrap_or(0);
    let mut processed = lookup_u64(obj, INDEX_KEYS)
        .or_else(|| lookup_u64(obj, PROCESSED_KEYS))
        .unwrap_or(0);
    if total > 0 && processed > total {
        tracing::debug!(
            target: "taskpulse.normalize",
            task_id = %id,
            processed,
            total,
            "processed exceeds total, clamping"
        );
        processed = total;
    }
    let failed = lookup_u64(obj, FAILED_KEYS).unwrap_or(0);

    let started_at = lookup_time(obj, STARTED_KEYS);
    // Only terminal records carry an end time.
    let ended_at = if status.is_terminal() {
        lookup_time(obj, ENDED_KEYS)
    } else {
        None
    };

    let params = PARAMS_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_object))
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    let last_error = if status == TaskStatus::Failed {
        lookup_str(obj, ERROR_KEYS)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    } else {
        None
    };

    let result_summary = if status.is_terminal() {
        RESULT_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .filter(|v| !v.is_null())
            .map(parse_result_summary)
    } else {
        None
    };

    Ok(Task {
        id,
        kind,
        status,
        total,
        processed,
        failed,
        started_at,
        ended_at,
        params,
        last_error,
        result_summary,
    })
}

/// Normalises a fetched batch, dropping (and logging) records with no id.
pub fn normalize_batch(raws: &[Value]) -> Vec<Task> {
    let mut out = Vec::with_capacity(raws.len());
    for (idx, raw) in raws.iter().enumerate() {
        match normalize_task(raw) {
            Ok(task) => out.push(task),
            Err(e) => {
                tracing::warn!(
                    target: "taskpulse.normalize",
                    index = idx,
                    error = %e,
                    "dropping malformed task record"
                );
            }
        }
    }
    out
}

/// Unwraps the common list envelopes (`[...]`, `{"tasks": [...]}`,
/// `{"data": [...]}`, `{"items": [...]}`).
///
/// Any other shape is a decode error, never an empty list: an empty batch
/// would replace every known record.
pub fn unwrap_list(body: Value, keys: &[&str]) -> Result<Vec<Value>, BackendError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => {
            for key in keys.iter().chain(["data", "items", "results"].iter()) {
                match obj.remove(*key) {
                    Some(Value::Array(items)) => return Ok(items),
                    Some(Value::Object(inner)) => {
                        return unwrap_list(Value::Object(inner), keys);
                    }
                    _ => {}
                }
            }
            let mut seen: Vec<&str> = obj.keys().map(String::as_str).collect();
            seen.truncate(8);
            Err(BackendError::Decode(format!(
                "expected a list or one of {keys:?}, got object with keys {seen:?}"
            )))
        }
        other => Err(BackendError::Decode(format!(
            "expected a list, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extracts the existing-task description from a create-conflict body.
///
/// Accepts the record at the top level or under `existing_task`, `task` or
/// `detail`, nested to any depth. Missing fields fall back to an empty id and `running`.
pub fn normalize_conflict(body: &Value) -> TaskConflict {
    let top = body.as_object();
    // Envelopes nest, e.g. `{"detail": {"existing_task": {...}}}`.
    let mut record = top;
    while let Some(inner) = record.and_then(|obj| {
        ["existing_task", "existingTask", "task", "detail"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_object))
    }) {
        record = Some(inner);
    }

    let message = top
        .and_then(|obj| lookup_str(obj, &["message", "error", "msg"]))
        .map(str::to_string);

    let Some(record) = record else {
        return TaskConflict {
            task_id: String::new(),
            status: TaskStatus::Running,
            progress: None,
            message,
        };
    };

    let status = lookup_str(record, STATUS_KEYS)
        .and_then(TaskStatus::parse_lenient)
        .unwrap_or(TaskStatus::Running);

    let progress = lookup_f64(record, PERCENT_KEYS)
        .map(|p| p.clamp(0.0, 100.0).floor() as u8)
        .or_else(|| {
            let total = lookup_u64(record, TOTAL_KEYS)?;
            let done = lookup_u64(record, INDEX_KEYS).or_else(|| lookup_u64(record, PROCESSED_KEYS))?;
            (total > 0).then(|| (u128::from(done.min(total)) * 100 / u128::from(total)) as u8)
        });

    TaskConflict {
        task_id: lookup_id(record).unwrap_or_default(),
        status,
        progress,
        message,
    }
}

fn parse_result_summary(v: &Value) -> ResultSummary {
    let list = |key: &str| -> Vec<String> {
        v.get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(value_to_string).collect())
            .unwrap_or_default()
    };
    ResultSummary {
        success: list("success"),
        failed: list("failed"),
        skipped: list("skipped"),
        raw: v.clone(),
    }
}

pub(crate) fn lookup_id(obj: &Map<String, Value>) -> Option<String> {
    ID_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(value_to_string))
        .filter(|s| !s.trim().is_empty())
}

pub(crate) fn lookup_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

pub(crate) fn lookup_bool(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

pub(crate) fn lookup_u64(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| value_to_u64(obj.get(*k)?))
}

fn lookup_f64(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    })
}

pub(crate) fn lookup_time(obj: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|k| parse_time(obj.get(*k)?))
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Negative or fractional counters are clamped / floored rather than rejected.
fn value_to_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|i| i.max(0) as u64))
            .or_else(|| n.as_f64().map(|f| f.max(0.0).floor() as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// RFC 3339, naive `YYYY-MM-DD HH:MM:SS[.f]` (taken as UTC), or epoch
/// seconds / milliseconds.
pub(crate) fn parse_time(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Anything past year ~2286 in seconds is really milliseconds.
            if raw > 10_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}
