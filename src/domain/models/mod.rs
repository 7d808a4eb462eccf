//! Domain models: pure data with no I/O.

pub mod config;
pub mod convergence;
pub mod credentials;
pub mod prompt;
pub mod route;
pub mod task;
pub mod timeout;

pub use config::{LoggingConfig, SessionConfig, TimeoutsConfig, WaypointConfig};
pub use convergence::{Outcome, OutcomeRecord};
pub use credentials::Credentials;
pub use route::{ActiveHop, ConnectionRoute, Hop, TargetKind, TransportKind};
pub use task::{ExpectedOutcome, TaskStatus, TaskVerdict};
pub use timeout::{NamedTimeout, DEFAULT_ITERATION_DELAY};
