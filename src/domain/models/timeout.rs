//! Named timeout catalogue.
//!
//! A timeout is the maximum amount of time one wait is allowed to take; any
//! wait exceeding it is an error surfaced to the caller, never a timer the
//! test logic silently sleeps through. Every convergence run is tagged with
//! the symbolic name of the timeout it ran under, so audit records stay
//! comparable across environments.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Symbolic timeout names consumed by the convergence loop and sessions.
///
/// Values are the defaults in seconds; individual names can be overridden
/// through [`crate::infrastructure::config::TimeoutTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedTimeout {
    /// Settle time before reading the output of an asynchronous command.
    AsyncReadSettle,
    /// Establishing a CLI session to any target.
    ConnectSession,
    /// One nested-console milestone (attach, login, password, shell).
    ConsoleCommand,
    /// A controller node finishing a reboot.
    ControllerReboot,
    /// A host process reporting ready after a restart.
    ProcessReady,
    /// A clustered service reporting restarted on every node.
    ServiceRestart,
    /// Reaching a VM shell over the nested console.
    VmShellReady,
}

impl NamedTimeout {
    /// Default budget in seconds for this named wait.
    pub const fn seconds(&self) -> u64 {
        match self {
            Self::AsyncReadSettle => 4,
            Self::ConnectSession => 120,
            Self::ConsoleCommand => 180,
            Self::ControllerReboot => 370,
            Self::ProcessReady => 25,
            Self::ServiceRestart => 300,
            Self::VmShellReady => 300,
        }
    }

    /// Default budget as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    /// Stable snake_case name used in audit records and config overrides.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AsyncReadSettle => "async_read_settle",
            Self::ConnectSession => "connect_session",
            Self::ConsoleCommand => "console_command",
            Self::ControllerReboot => "controller_reboot",
            Self::ProcessReady => "process_ready",
            Self::ServiceRestart => "service_restart",
            Self::VmShellReady => "vm_shell_ready",
        }
    }
}

impl NamedTimeout {
    /// Look a timeout up by its stable name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Every timeout in the catalogue.
    pub const ALL: [Self; 7] = [
        Self::AsyncReadSettle,
        Self::ConnectSession,
        Self::ConsoleCommand,
        Self::ControllerReboot,
        Self::ProcessReady,
        Self::ServiceRestart,
        Self::VmShellReady,
    ];
}

impl fmt::Display for NamedTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Default delay between convergence-loop iterations.
pub const DEFAULT_ITERATION_DELAY: Duration = Duration::from_secs(2);
