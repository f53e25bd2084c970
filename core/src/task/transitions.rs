//! 任务状态转换规则和验证
//!
//! The engine never drives these transitions itself; it only interprets
//! what successive polls report.

use super::model::TaskStatus;
use thiserror::Error;

/// 状态转换错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("Cannot transition from terminal state {state:?}")]
    FromTerminalState { state: TaskStatus },
}

/// How a status change between two polls of the same task should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Status did not change.
    Unchanged,
    /// A single legal step of the state machine.
    Step,
    /// Legal overall, but one or more intermediate states happened between
    /// polls (e.g. `pending` straight to `completed`).
    Skipped,
    /// Non-terminal status moved backwards (e.g. `running` to `pending`).
    Regression,
    /// A terminal record reported a different status afterwards.
    TerminalViolation,
}

/// 状态转换
pub struct TaskTransition;

impl TaskTransition {
    /// 验证状态转换是否合法
    pub fn validate(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
        // 终态不能转换
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Paused)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Stopped)
                | (TaskStatus::Paused, TaskStatus::Running)
                | (TaskStatus::Paused, TaskStatus::Stopped)
        );

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    /// Classifies the change seen between two polls.
    pub fn observe(from: TaskStatus, to: TaskStatus) -> Observation {
        if from == to {
            return Observation::Unchanged;
        }
        if from.is_terminal() {
            return Observation::TerminalViolation;
        }
        if Self::validate(from, to).is_ok() {
            return Observation::Step;
        }
        if to == TaskStatus::Pending {
            Observation::Regression
        } else {
            // Between two polls a task can pass through any number of
            // legal states; anything forward of `pending` is reachable.
            Observation::Skipped
        }
    }

    /// Status a successful control command is expected to produce.
    pub fn expected_after(action: TaskAction) -> TaskStatus {
        match action {
            TaskAction::Pause => TaskStatus::Paused,
            TaskAction::Resume => TaskStatus::Running,
            TaskAction::Stop => TaskStatus::Stopped,
        }
    }
}

/// Control actions that request a status change on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskAction {
    Pause,
    Resume,
    Stop,
}

impl TaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
