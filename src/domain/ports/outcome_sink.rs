//! Outcome reporting port.
//!
//! Every convergence run emits exactly one [`OutcomeRecord`]. The sink is an
//! injected collaborator so tests can assert on records without scraping
//! logs.

use std::sync::Mutex;

use crate::domain::models::OutcomeRecord;

pub trait OutcomeSink: Send + Sync {
    fn record(&self, record: OutcomeRecord);
}

/// Emits each record as a structured tracing event.
#[derive(Debug, Default)]
pub struct TracingOutcomeSink;

impl OutcomeSink for TracingOutcomeSink {
    fn record(&self, record: OutcomeRecord) {
        tracing::info!(
            id = %record.id,
            operation = record.operation.name(),
            outcome = record.outcome.as_str(),
            iterations = record.iterations,
            started_at = %record.started_at,
            finished_at = %record.finished_at,
            "convergence outcome"
        );
    }
}

/// Retains records in memory for inspection.
#[derive(Debug, Default)]
pub struct RecordingOutcomeSink {
    records: Mutex<Vec<OutcomeRecord>>,
}

impl RecordingOutcomeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OutcomeRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl OutcomeSink for RecordingOutcomeSink {
    fn record(&self, record: OutcomeRecord) {
        match self.records.lock() {
            Ok(mut guard) => guard.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
