//! Ports: trait boundaries between the core services and the outside world.

pub mod outcome_sink;
pub mod provisioner;
pub mod transport;

pub use outcome_sink::{OutcomeSink, RecordingOutcomeSink, TracingOutcomeSink};
pub use provisioner::{KeyProvisioner, ProvisionError, ShellKeyProvisioner};
pub use transport::{CliChannel, CliTransport, ConnectParams, TransportError};
