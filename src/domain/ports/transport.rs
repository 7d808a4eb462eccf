//! CLI transport port.
//!
//! The core never implements a wire protocol. An SSH/telnet-capable CLI
//! client is an external collaborator behind these traits; the session layer
//! owns one [`CliChannel`] at a time and closes it on disconnect.

use async_trait::async_trait;
use thiserror::Error;

/// Failure classes surfaced by the transport.
///
/// `AuthenticationFailed`, `ConnectionRefused` and `Timeout` are the classes
/// a route may recover from with a fallback hop; everything else escalates
/// as-is.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("authentication failed for {username}@{address}:{port}")]
    AuthenticationFailed {
        address: String,
        port: u16,
        username: String,
    },

    #[error("connection refused by {address}:{port}")]
    ConnectionRefused { address: String, port: u16 },

    #[error("protocol timeout talking to {address}:{port}")]
    Timeout { address: String, port: u16 },

    #[error("transport protocol error: {0}")]
    Protocol(String),

    #[error("channel is closed")]
    ChannelClosed,
}

impl TransportError {
    /// Whether a fallback hop is allowed to recover from this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::ConnectionRefused { .. } | Self::Timeout { .. }
        )
    }

    /// Whether this failure should trigger key provisioning.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

/// Parameters for one connect attempt.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub address: String,
    pub username: String,
    pub password: Option<String>,
    pub port: u16,
    /// Regex the transport matches trailing output against to decide the
    /// channel has reached a prompt.
    pub expected_prompt: String,
    /// Per-command send timeout in milliseconds.
    pub send_timeout_ms: u64,
}

/// Factory for CLI channels. Implemented by the external CLI client.
#[async_trait]
pub trait CliTransport: Send + Sync {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn CliChannel>, TransportError>;
}

/// One interactive CLI channel.
#[async_trait]
pub trait CliChannel: Send {
    /// Send a command and block until the expected prompt is matched,
    /// returning the output produced before the prompt.
    async fn send(&mut self, command: &str) -> Result<String, TransportError>;

    /// Send a command without waiting for a prompt match.
    async fn send_async(&mut self, command: &str) -> Result<(), TransportError>;

    /// Read whatever output is currently buffered.
    async fn read_buffered(&mut self) -> Result<String, TransportError>;

    /// Replace the expected-prompt regex for subsequent sends.
    fn set_expected_prompt(&mut self, regex: &str);

    /// The concrete prompt text most recently matched.
    fn matched_prompt(&self) -> String;

    async fn disconnect(&mut self);
}
