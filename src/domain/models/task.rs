//! Parallel task bookkeeping model.

use serde::{Deserialize, Serialize};

/// What the submitter expects a task's execution to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    /// The task is expected to complete without error.
    Success,
    /// The task is expected to fail; its error message is the result.
    Failure,
}

/// Derived running status of a submitted task.
///
/// Statuses are computed on demand from the underlying join handle, never
/// pushed by the task itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Dispatched and still running.
    Started,
    /// Execution finished (successfully or not).
    Finished,
    /// Execution was aborted before it finished.
    Stopped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Stopped => "stopped",
        }
    }
}

/// Judged result of awaiting a task against its expected outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskVerdict {
    /// Expected success, got success.
    Success,
    /// Expected failure, got a failure; the message is captured, not raised.
    CapturedFailure(String),
    /// Expected failure, but the task succeeded. Distinguishable on purpose
    /// so mismatched expectations cannot masquerade as clean runs.
    UnexpectedSuccess,
}

impl TaskVerdict {
    /// Legacy calling convention: `None` on success, the captured message on
    /// an expected failure.
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Self::CapturedFailure(message) => Some(message),
            Self::Success | Self::UnexpectedSuccess => None,
        }
    }
}
