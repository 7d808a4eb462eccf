//! Convergence outcome model.
//!
//! Every run of the convergence loop produces exactly one [`OutcomeRecord`],
//! keyed by a fresh UUID so individual waits can be audited long after the
//! run finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timeout::NamedTimeout;

/// Terminal outcome of one convergence-loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The sampled state matched the expected value.
    Success,
    /// The budget (timeout x multiplier) was exhausted without a match.
    TimedOut,
    /// The configured error state was observed; the wait was interrupted.
    Exception,
    /// The caller's cancellation channel fired mid-wait.
    Canceled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TimedOut => "timed_out",
            Self::Exception => "exception",
            Self::Canceled => "canceled",
        }
    }
}

/// Audit record emitted to the [`crate::domain::ports::OutcomeSink`] for
/// every convergence run, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Unique key for this run.
    pub id: Uuid,
    /// Symbolic name of the timeout the run was bounded by.
    pub operation: NamedTimeout,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: Outcome,
    /// Number of samples taken before the run terminated.
    pub iterations: u32,
}

impl OutcomeRecord {
    pub fn new(
        operation: NamedTimeout,
        started_at: DateTime<Utc>,
        outcome: Outcome,
        iterations: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            started_at,
            finished_at: Utc::now(),
            outcome,
            iterations,
        }
    }
}
