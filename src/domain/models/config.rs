//! Crate configuration model.
//!
//! Loaded by [`crate::infrastructure::config::ConfigLoader`] from YAML plus
//! `WAYPOINT_`-prefixed environment overrides.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaypointConfig {
    pub timeouts: TimeoutsConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Per-name overrides for the named-timeout catalogue, in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Map of snake_case timeout name to replacement budget in seconds.
    pub overrides: HashMap<String, u64>,
}

/// Session-layer tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Universal per-command send timeout handed to the transport.
    pub send_timeout_ms: u64,
    /// Delay between convergence iterations driven by sessions, in seconds.
    pub iteration_delay_secs: u64,
    /// Whether sessions may fall back to an alternate hop.
    pub fail_safe: bool,
    /// ConnectTimeout passed to second-leg ssh commands, in seconds.
    pub ssh_connect_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: 60_000,
            iteration_delay_secs: 10,
            fail_safe: true,
            ssh_connect_timeout_secs: 30,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `waypoint=debug`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
