//! Waypoint: convergence waits and multi-hop CLI sessions for cloud test
//! automation.
//!
//! Two primitives carry everything else:
//!
//! - [`services::ConvergenceLoop`] — the only wait/retry mechanism: sample a
//!   piece of remote state until it matches an expected value, interrupt at
//!   once on a distinguished error value, give up when the wall-clock
//!   budget is spent.
//! - [`services::RemoteSession`] with [`services::HopRouter`] and
//!   [`services::NestedConsole`] — interactive CLI sessions to deeply
//!   nested targets: direct, via a fallback jump host, or through a
//!   console command issued on the target's physical host.
//!
//! [`services::ParallelTaskRunner`] drives independent sessions/targets
//! concurrently with expected-outcome bookkeeping.
//!
//! The transport itself (an SSH/telnet-capable CLI client) is an external
//! collaborator behind [`domain::ports::CliTransport`];
//! [`adapters::ScriptedTransport`] is the in-memory double used by tests.

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{ConnectionError, SessionError};
pub use domain::models::{
    ConnectionRoute, Credentials, ExpectedOutcome, Hop, NamedTimeout, Outcome, OutcomeRecord,
    TargetKind, TaskStatus, TaskVerdict, TransportKind,
};
pub use domain::ports::{CliChannel, CliTransport, ConnectParams, OutcomeSink, TransportError};
pub use services::{
    BackoffStrategy, ConvergenceError, ConvergenceLoop, ConvergenceSpec, HopRouter, NestedConsole,
    ParallelTaskRunner, RemoteSession, TaskError,
};
