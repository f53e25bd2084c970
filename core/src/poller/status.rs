use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::BackendError;

/// Why a fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOrigin {
    /// Fired by the interval timer; skipped while another fetch is in flight.
    Tick,
    /// Out-of-band refresh (after a command, or on request); always fetches.
    OutOfBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    /// A task is running or polling was explicitly started.
    Active,
    /// Nothing running; still ticking to notice tasks created elsewhere.
    Idle,
}

/// Aggregate health of the poll loop, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollingStatus {
    Stopped,
    Polling { mode: PollMode },
    /// Too many consecutive failures; the timer is off until restarted.
    CircuitOpen { failures: u32, last_error: String },
}

impl PollingStatus {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// What happened to a single fetch.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Applied {
        seq: u64,
        version: u64,
        task_count: usize,
    },
    /// Timer tick while another fetch was still pending.
    Skipped,
    /// Resolved after a later fetch had already been applied.
    Stale { seq: u64 },
    /// Resolved after the controller was stopped.
    Discarded { seq: u64 },
    Failed {
        seq: u64,
        consecutive_failures: u32,
        error: BackendError,
    },
    /// This failure reached the threshold and stopped the timer.
    CircuitOpened {
        seq: u64,
        failures: u32,
        error: BackendError,
    },
    /// The controller was shut down; nothing was fetched.
    Closed,
}

impl PollOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Point-in-time diagnostics for the poll loop.
#[derive(Debug, Clone, Serialize)]
pub struct PollingSnapshot {
    pub status: PollingStatus,
    pub consecutive_failures: u32,
    pub last_issued_seq: u64,
    pub last_applied_seq: u64,
    pub in_flight: usize,
    pub manual: bool,
    pub timer_running: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
