//! Credential pair used for one hop.

use serde::{Deserialize, Serialize};

/// Username plus optional password for a single hop.
///
/// A missing password means key-based authentication is expected; sessions
/// may still be prompted for a password mid-negotiation, in which case the
/// one-shot override on the session applies first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
        }
    }

    /// Key-based authentication; no password on record.
    pub fn passwordless(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }
}
