use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::config::WaypointConfig;
use crate::domain::models::NamedTimeout;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid send_timeout_ms: {0}. Must be positive")]
    InvalidSendTimeout(u64),

    #[error("Invalid iteration_delay_secs: {0}. Must be positive")]
    InvalidIterationDelay(u64),

    #[error("Unknown timeout name in overrides: {0}")]
    UnknownTimeoutName(String),

    #[error("Timeout override for {0} must be positive")]
    ZeroTimeoutOverride(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. waypoint.yaml in the working directory
    /// 3. Environment variables (WAYPOINT_* prefix, highest priority)
    pub fn load() -> Result<WaypointConfig> {
        let config: WaypointConfig = Figment::new()
            .merge(Serialized::defaults(WaypointConfig::default()))
            .merge(Yaml::file("waypoint.yaml"))
            .merge(Env::prefixed("WAYPOINT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<WaypointConfig> {
        let config: WaypointConfig = Figment::new()
            .merge(Serialized::defaults(WaypointConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context("Failed to extract configuration from file")?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &WaypointConfig) -> Result<(), ConfigError> {
        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
        match config.logging.format.as_str() {
            "json" | "pretty" => {}
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
        if config.session.send_timeout_ms == 0 {
            return Err(ConfigError::InvalidSendTimeout(config.session.send_timeout_ms));
        }
        if config.session.iteration_delay_secs == 0 {
            return Err(ConfigError::InvalidIterationDelay(
                config.session.iteration_delay_secs,
            ));
        }
        for (name, seconds) in &config.timeouts.overrides {
            if NamedTimeout::from_name(name).is_none() {
                return Err(ConfigError::UnknownTimeoutName(name.clone()));
            }
            if *seconds == 0 {
                return Err(ConfigError::ZeroTimeoutOverride(name.clone()));
            }
        }
        Ok(())
    }
}

/// Named-timeout catalogue with configured overrides applied.
#[derive(Debug, Clone, Default)]
pub struct TimeoutTable {
    overrides: std::collections::HashMap<String, u64>,
}

impl TimeoutTable {
    pub fn from_config(config: &WaypointConfig) -> Self {
        Self {
            overrides: config.timeouts.overrides.clone(),
        }
    }

    /// Budget for a named timeout, preferring the configured override.
    pub fn resolve(&self, timeout: NamedTimeout) -> Duration {
        self.overrides
            .get(timeout.name())
            .map_or_else(|| timeout.duration(), |secs| Duration::from_secs(*secs))
    }
}
