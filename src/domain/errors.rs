//! Domain errors for the session layer.

use thiserror::Error;

use crate::domain::models::{TargetKind, TransportKind};
use crate::domain::ports::transport::TransportError;

/// A connection to a target could not be established, after any applicable
/// fallback attempt. Carries the full hop identity so the failure can be
/// diagnosed without access to the session's internals.
#[derive(Debug, Error)]
#[error(
    "could not create a {transport} connection to {target} via {via} \
     ({address}:{port}, user {username})"
)]
pub struct ConnectionError {
    pub transport: TransportKind,
    /// The final destination being reached.
    pub target: TargetKind,
    /// The hop the failure occurred on.
    pub via: TargetKind,
    pub address: String,
    pub port: u16,
    pub username: String,
    #[source]
    pub cause: Option<TransportError>,
}

impl ConnectionError {
    pub fn new(
        transport: TransportKind,
        target: TargetKind,
        via: TargetKind,
        address: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        cause: Option<TransportError>,
    ) -> Self {
        Self {
            transport,
            target,
            via,
            address: address.into(),
            port,
            username: username.into(),
            cause,
        }
    }
}

/// Errors raised by an established session or mid-negotiation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session to {0} is not connected")]
    NotConnected(TargetKind),

    #[error(
        "the session was prompted for a password but none is on record for \
         user {0}; set a one-shot password or use credentials that carry one"
    )]
    MissingPassword(String),

    #[error(
        "prompt negotiation with {target} still unsettled after {rounds} \
         password/continue rounds"
    )]
    NegotiationStalled { target: TargetKind, rounds: usize },

    #[error("an active console session already exists for instance {0}")]
    ConsoleBusy(String),

    #[error("console milestone `{milestone}` not reached: {reason}")]
    ConsoleMilestone { milestone: String, reason: String },

    #[error(
        "connected to the wrong hop: matched prompt {matched:?} belongs to \
         {actual}, expected {expected}"
    )]
    WrongHop {
        matched: String,
        actual: TargetKind,
        expected: TargetKind,
    },

    #[error("invalid prompt pattern: {0}")]
    InvalidPrompt(#[from] regex::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
