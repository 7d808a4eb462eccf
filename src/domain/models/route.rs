//! Connection routes: hops, targets and transports.
//!
//! A route is an ordered choice of hops towards a target: one declared
//! primary hop and at most one fallback. Once a fallback is chosen it stays
//! the active hop for every reconnect in the session's lifetime until the
//! route is explicitly reset.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::credentials::Credentials;

/// Kind of target a session terminates at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Cluster controller node.
    Controller,
    /// Orchestration host fronting the cluster.
    Orchestrator,
    /// Jump host used when the orchestrator is unreachable.
    JumpHost,
    /// Compute node hosting virtual machines.
    Compute,
    /// Virtual machine reached through its compute host's console.
    Vm,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Orchestrator => "orchestrator",
            Self::JumpHost => "jump host",
            Self::Compute => "compute node",
            Self::Vm => "vm",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transport protocol a connection is made over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Ssh,
    Scp,
    Rest,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => write!(f, "SSH"),
            Self::Scp => write!(f, "SCP"),
            Self::Rest => write!(f, "REST"),
        }
    }
}

/// One network/credential transition on the way to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    /// Which kind of host this hop lands on.
    pub kind: TargetKind,
    pub address: String,
    pub port: u16,
    pub credentials: Credentials,
    /// Role-specific prompt fragment OR-ed into the expected-prompt regex.
    pub role_prompt: String,
}

impl Hop {
    pub fn new(
        kind: TargetKind,
        address: impl Into<String>,
        port: u16,
        credentials: Credentials,
        role_prompt: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            address: address.into(),
            port,
            credentials,
            role_prompt: role_prompt.into(),
        }
    }
}

/// Which hop of a route is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveHop {
    Primary,
    Fallback,
}

/// Ordered hop choice with a declared primary and zero or one fallback.
#[derive(Debug, Clone)]
pub struct ConnectionRoute {
    primary: Hop,
    fallback: Option<Hop>,
    active: ActiveHop,
}

impl ConnectionRoute {
    pub fn new(primary: Hop) -> Self {
        Self {
            primary,
            fallback: None,
            active: ActiveHop::Primary,
        }
    }

    pub fn with_fallback(primary: Hop, fallback: Hop) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
            active: ActiveHop::Primary,
        }
    }

    /// The hop connect attempts should currently use.
    pub fn active_hop(&self) -> &Hop {
        match self.active {
            ActiveHop::Primary => &self.primary,
            // Invariant: active is only ever Fallback when a fallback exists.
            ActiveHop::Fallback => self.fallback.as_ref().unwrap_or(&self.primary),
        }
    }

    pub fn active(&self) -> ActiveHop {
        self.active
    }

    pub fn fallback(&self) -> Option<&Hop> {
        self.fallback.as_ref()
    }

    /// Switch to the fallback hop. Returns the fallback if one is configured
    /// and not already active; the choice is sticky for later reconnects.
    pub fn select_fallback(&mut self) -> Option<&Hop> {
        if self.fallback.is_none() || self.active == ActiveHop::Fallback {
            return None;
        }
        self.active = ActiveHop::Fallback;
        self.fallback.as_ref()
    }

    /// Forget a sticky fallback choice and route via the primary hop again.
    pub fn reset(&mut self) {
        self.active = ActiveHop::Primary;
    }
}
