//! Parallel task execution with expected-outcome bookkeeping.
//!
//! Callers submit independent tasks keyed by id, each declared to be
//! expected to succeed or to fail (e.g. a negative test deliberately
//! restarting a service that must refuse). Results are collected by
//! awaiting per task, not through a fan-in barrier. All bookkeeping lives
//! behind one lock; the runner is safe to share across tasks via clone,
//! and any number of clones may await the same id.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::AbortHandle;

use crate::domain::models::{ExpectedOutcome, TaskStatus, TaskVerdict};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("no task submitted with id {0}")]
    Unknown(String),

    #[error("task {id} was expected to succeed but failed: {message}")]
    Failed { id: String, message: String },

    #[error("task {id} panicked: {message}")]
    Panicked { id: String, message: String },

    #[error("task {id} was stopped before completion")]
    Stopped { id: String },
}

enum Execution {
    Running {
        abort: AbortHandle,
        /// Signalled by the watcher once a terminal state is in the map.
        done: watch::Receiver<bool>,
    },
    /// Outcome retained so repeated awaits observe the same verdict.
    Settled(Result<(), String>),
    Panicked(String),
    Stopped,
}

struct TaskEntry {
    expected: ExpectedOutcome,
    execution: Execution,
}

/// Dispatches independent tasks onto the runtime and records what each one
/// was expected to do.
#[derive(Clone, Default)]
pub struct ParallelTaskRunner {
    tasks: Arc<RwLock<HashMap<String, TaskEntry>>>,
}

impl ParallelTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a task under `id`. Re-submitting an id that is already known
    /// is a no-op by contract; the existing execution keeps running.
    pub async fn submit<F>(&self, id: impl Into<String>, expected: ExpectedOutcome, task: F)
    where
        F: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let id = id.into();
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&id) {
            tracing::debug!(task = %id, "task already submitted, ignoring");
            return;
        }
        tracing::debug!(task = %id, expected = ?expected, "dispatching task");

        let handle = tokio::spawn(task);
        let abort = handle.abort_handle();
        let (done_tx, done_rx) = watch::channel(false);

        // A watcher task owns the join handle: it writes the terminal state
        // into the map and wakes every awaiter, so the result does not hinge
        // on any one awaiter surviving long enough to publish it. The entry
        // is inserted before this write lock drops, so the watcher cannot
        // settle a task the map has never seen.
        let watcher_tasks = Arc::clone(&self.tasks);
        let watcher_id = id.clone();
        tokio::spawn(async move {
            let execution = match handle.await {
                Ok(Ok(())) => Execution::Settled(Ok(())),
                Ok(Err(err)) => Execution::Settled(Err(format!("{err:#}"))),
                Err(join_err) if join_err.is_cancelled() => Execution::Stopped,
                Err(join_err) => Execution::Panicked(join_err.to_string()),
            };
            let mut tasks = watcher_tasks.write().await;
            if let Some(entry) = tasks.get_mut(&watcher_id) {
                entry.execution = execution;
            }
            let _ = done_tx.send(true);
        });

        tasks.insert(
            id,
            TaskEntry {
                expected,
                execution: Execution::Running {
                    abort,
                    done: done_rx,
                },
            },
        );
    }

    /// Current status of every submitted task, derived on demand.
    pub async fn status(&self) -> HashMap<String, TaskStatus> {
        let tasks = self.tasks.read().await;
        tasks
            .iter()
            .map(|(id, entry)| (id.clone(), Self::status_of(entry)))
            .collect()
    }

    /// Whether every submitted task has reached a terminal status.
    pub async fn all_finished(&self) -> bool {
        let tasks = self.tasks.read().await;
        tasks.values().all(|entry| {
            matches!(
                Self::status_of(entry),
                TaskStatus::Finished | TaskStatus::Stopped
            )
        })
    }

    /// Abort a running task. Settled tasks are left untouched.
    pub async fn stop(&self, id: &str) {
        let mut tasks = self.tasks.write().await;
        if let Some(entry) = tasks.get_mut(id) {
            if let Execution::Running { abort, .. } = &entry.execution {
                abort.abort();
                entry.execution = Execution::Stopped;
            }
        }
    }

    /// Await the task's completion and judge it against its expected
    /// outcome. Concurrent awaiters of the same id all observe the same
    /// verdict.
    ///
    /// A task expected to succeed that fails propagates the failure as
    /// [`TaskError::Failed`]. A task expected to fail that does fail has
    /// its message captured into the verdict instead. A task expected to
    /// fail that succeeds is flagged as [`TaskVerdict::UnexpectedSuccess`]
    /// rather than silently accepted.
    pub async fn await_result(&self, id: &str) -> Result<TaskVerdict, TaskError> {
        loop {
            let mut done = {
                let tasks = self.tasks.read().await;
                let entry = tasks
                    .get(id)
                    .ok_or_else(|| TaskError::Unknown(id.to_string()))?;
                match &entry.execution {
                    Execution::Running { done, .. } => done.clone(),
                    Execution::Settled(result) => {
                        return Self::judge(id, entry.expected, result.clone());
                    }
                    Execution::Panicked(message) => {
                        return Err(TaskError::Panicked {
                            id: id.to_string(),
                            message: message.clone(),
                        });
                    }
                    Execution::Stopped => {
                        return Err(TaskError::Stopped { id: id.to_string() });
                    }
                }
            };
            // Parked until the watcher publishes the terminal state. The
            // flag is only a wakeup; the map is re-read either way.
            if !*done.borrow_and_update() {
                let _ = done.changed().await;
            }
        }
    }

    fn status_of(entry: &TaskEntry) -> TaskStatus {
        match &entry.execution {
            Execution::Running { abort, .. } if abort.is_finished() => TaskStatus::Finished,
            Execution::Running { .. } => TaskStatus::Started,
            Execution::Settled(_) | Execution::Panicked(_) => TaskStatus::Finished,
            Execution::Stopped => TaskStatus::Stopped,
        }
    }

    fn judge(
        id: &str,
        expected: ExpectedOutcome,
        result: Result<(), String>,
    ) -> Result<TaskVerdict, TaskError> {
        match (expected, result) {
            (ExpectedOutcome::Success, Ok(())) => Ok(TaskVerdict::Success),
            (ExpectedOutcome::Success, Err(message)) => Err(TaskError::Failed {
                id: id.to_string(),
                message,
            }),
            (ExpectedOutcome::Failure, Err(message)) => Ok(TaskVerdict::CapturedFailure(message)),
            (ExpectedOutcome::Failure, Ok(())) => Ok(TaskVerdict::UnexpectedSuccess),
        }
    }
}
