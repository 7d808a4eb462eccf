//! Credential provisioning port.
//!
//! When a hop rejects authentication, the router may install credentials on
//! the target (typically an SSH public key pushed through a management
//! channel) and retry the same hop once.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::domain::models::Hop;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("provisioning command failed for {address}: {stderr}")]
    CommandFailed { address: String, stderr: String },

    #[error("could not spawn provisioning command: {0}")]
    Spawn(#[from] std::io::Error),
}

#[async_trait]
pub trait KeyProvisioner: Send + Sync {
    async fn install_key(&self, hop: &Hop) -> Result<(), ProvisionError>;
}

/// Installs a key by running a configured shell command with the hop address
/// appended as its final argument.
#[derive(Debug, Clone)]
pub struct ShellKeyProvisioner {
    program: String,
    args: Vec<String>,
}

impl ShellKeyProvisioner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl KeyProvisioner for ShellKeyProvisioner {
    async fn install_key(&self, hop: &Hop) -> Result<(), ProvisionError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&hop.address)
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ProvisionError::CommandFailed {
                address: hop.address.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}
