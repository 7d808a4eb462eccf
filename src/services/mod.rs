//! Service layer: the convergence loop, the task runner and the session
//! stack built on top of them.

pub mod console;
pub mod convergence;
pub mod hop_router;
pub mod session;
pub mod task_runner;

pub use console::{ConsoleProbe, NestedConsole};
pub use convergence::{BackoffStrategy, ConvergenceError, ConvergenceLoop, ConvergenceSpec};
pub use hop_router::{HopRouter, WrongHopSignature};
pub use session::{RemoteSession, SessionState};
pub use task_runner::{ParallelTaskRunner, TaskError};
