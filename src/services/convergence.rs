//! Bounded convergence loop.
//!
//! The single wait/retry primitive of the crate: repeatedly sample a piece
//! of remote state until it equals an expected value, interrupt immediately
//! on a distinguished error value, and give up once the wall-clock budget
//! (timeout x multiplier) is spent. Every run emits one [`OutcomeRecord`]
//! to the injected [`OutcomeSink`].

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::domain::errors::SessionError;
use crate::domain::models::{NamedTimeout, Outcome, OutcomeRecord, DEFAULT_ITERATION_DELAY};
use crate::domain::ports::OutcomeSink;

/// Delay schedule between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// The same delay after every sample.
    Fixed(Duration),
    /// Delay doubles after each sample, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl BackoffStrategy {
    /// Delay to sleep after the sample numbered `iteration` (1-based).
    pub fn delay_for(&self, iteration: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { initial, max } => {
                let exp = iteration.saturating_sub(1).min(16);
                initial.saturating_mul(1_u32 << exp).min(max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_ITERATION_DELAY)
    }
}

/// One wait, fully described: what to sample, what counts as done, what
/// counts as fatal, and how long to keep trying.
///
/// Built per invocation and consumed by [`ConvergenceLoop::run`].
pub struct ConvergenceSpec<T, F> {
    operation: NamedTimeout,
    message: String,
    expected: T,
    sampler: F,
    error_state: Option<T>,
    backoff: BackoffStrategy,
    multiplier: u32,
    budget_override: Option<Duration>,
    cancel: Option<watch::Receiver<bool>>,
}

impl<T, F> ConvergenceSpec<T, F> {
    pub fn new(
        operation: NamedTimeout,
        message: impl Into<String>,
        expected: T,
        sampler: F,
    ) -> Self {
        Self {
            operation,
            message: message.into(),
            expected,
            sampler,
            error_state: None,
            backoff: BackoffStrategy::default(),
            multiplier: 1,
            budget_override: None,
            cancel: None,
        }
    }

    /// A state that interrupts the wait immediately when observed.
    #[must_use]
    pub fn error_state(mut self, state: T) -> Self {
        self.error_state = Some(state);
        self
    }

    /// Fixed delay between samples. Shorthand for a fixed backoff.
    #[must_use]
    pub fn iteration_delay(mut self, delay: Duration) -> Self {
        self.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Scales the total budget, not each iteration's allowance.
    #[must_use]
    pub fn multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Replace the budget derived from the named timeout.
    #[must_use]
    pub fn budget(mut self, budget: Duration) -> Self {
        self.budget_override = Some(budget);
        self
    }

    /// Cancellation channel observed while sleeping between samples. A
    /// `true` value aborts the wait with [`ConvergenceError::Canceled`].
    #[must_use]
    pub fn cancel(mut self, token: watch::Receiver<bool>) -> Self {
        self.cancel = Some(token);
        self
    }

    fn total_budget(&self) -> Duration {
        self.budget_override
            .unwrap_or_else(|| self.operation.duration())
            .saturating_mul(self.multiplier)
    }
}

/// Terminal failures of a convergence run.
#[derive(Debug, Error)]
pub enum ConvergenceError<T: Debug> {
    /// The configured error state was observed, or the sampler itself
    /// failed. Never retried, even with budget remaining.
    #[error("{message}: interrupted after {elapsed:?} (observed {observed:?})")]
    Interrupted {
        message: String,
        elapsed: Duration,
        observed: Option<T>,
        #[source]
        source: Option<SessionError>,
    },

    /// The full budget was spent without the sampled state matching.
    #[error(
        "{message}: timed out after {elapsed:?} (iteration delay {iteration_delay:?}, last state {last_state:?})"
    )]
    TimedOut {
        message: String,
        elapsed: Duration,
        iteration_delay: Duration,
        last_state: Option<T>,
    },

    /// The caller's cancellation channel fired mid-wait.
    #[error("{message}: canceled after {elapsed:?}")]
    Canceled { message: String, elapsed: Duration },
}

/// Runs [`ConvergenceSpec`]s and reports each run to the sink.
pub struct ConvergenceLoop<S> {
    sink: Arc<S>,
}

impl<S: OutcomeSink> ConvergenceLoop<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }

    /// Drive the spec to a terminal outcome.
    ///
    /// Returns the matching state on success. Samples strictly
    /// sequentially; the error-state check wins over continued polling. The
    /// first sample happens without any prior sleep.
    pub async fn run<T, F, Fut>(
        &self,
        mut spec: ConvergenceSpec<T, F>,
    ) -> Result<T, ConvergenceError<T>>
    where
        T: PartialEq + Debug + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, SessionError>> + Send,
    {
        let budget = spec.total_budget();
        let start = Instant::now();
        let started_at = Utc::now();
        let mut iterations: u32 = 0;
        let mut last_state: Option<T> = None;

        loop {
            if start.elapsed() >= budget {
                let elapsed = start.elapsed();
                tracing::warn!(
                    operation = spec.operation.name(),
                    ?elapsed,
                    iterations,
                    "convergence timed out: {}",
                    spec.message
                );
                self.report(&spec, started_at, Outcome::TimedOut, iterations);
                return Err(ConvergenceError::TimedOut {
                    message: spec.message,
                    elapsed,
                    iteration_delay: spec.backoff.delay_for(iterations.max(1)),
                    last_state,
                });
            }

            iterations += 1;
            let state = match (spec.sampler)().await {
                Ok(state) => state,
                Err(err) => {
                    let elapsed = start.elapsed();
                    self.report(&spec, started_at, Outcome::Exception, iterations);
                    return Err(ConvergenceError::Interrupted {
                        message: spec.message,
                        elapsed,
                        observed: None,
                        source: Some(err),
                    });
                }
            };

            if state == spec.expected {
                let elapsed = start.elapsed();
                tracing::info!(
                    operation = spec.operation.name(),
                    ?elapsed,
                    iterations,
                    "converged: {}",
                    spec.message
                );
                self.report(&spec, started_at, Outcome::Success, iterations);
                return Ok(state);
            }

            if spec.error_state.as_ref() == Some(&state) {
                let elapsed = start.elapsed();
                self.report(&spec, started_at, Outcome::Exception, iterations);
                return Err(ConvergenceError::Interrupted {
                    message: spec.message,
                    elapsed,
                    observed: Some(state),
                    source: None,
                });
            }

            tracing::debug!(
                operation = spec.operation.name(),
                iterations,
                observed = ?state,
                "state not converged yet"
            );
            last_state = Some(state);

            let delay = spec.backoff.delay_for(iterations);
            if self.sleep(delay, spec.cancel.as_mut()).await {
                let elapsed = start.elapsed();
                self.report(&spec, started_at, Outcome::Canceled, iterations);
                return Err(ConvergenceError::Canceled {
                    message: spec.message,
                    elapsed,
                });
            }
        }
    }

    /// Sleep for `delay`, returning true if the cancellation channel fired.
    async fn sleep(&self, delay: Duration, cancel: Option<&mut watch::Receiver<bool>>) -> bool {
        let Some(token) = cancel else {
            tokio::time::sleep(delay).await;
            return false;
        };
        if *token.borrow() {
            return true;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => false,
            changed = token.changed() => match changed {
                Ok(()) => *token.borrow(),
                // Sender dropped without signaling: keep waiting out the delay.
                Err(_) => {
                    tokio::time::sleep(delay).await;
                    false
                }
            },
        }
    }

    fn report<T, F>(
        &self,
        spec: &ConvergenceSpec<T, F>,
        started_at: chrono::DateTime<Utc>,
        outcome: Outcome,
        iterations: u32,
    ) {
        self.sink
            .record(OutcomeRecord::new(spec.operation, started_at, outcome, iterations));
    }
}
