//! Nested console sessions: reaching a guest VM through its compute host.
//!
//! No network hop exists to the guest. Instead, a `virsh console` command is
//! issued inside an already-established host session and the login dialogue
//! is driven milestone by milestone, each milestone waited on with a
//! convergence loop sampling the channel's buffered output.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::domain::errors::SessionError;
use crate::domain::models::{prompt, Credentials, NamedTimeout, SessionConfig};
use crate::domain::ports::OutcomeSink;
use crate::services::convergence::{ConvergenceError, ConvergenceLoop, ConvergenceSpec};
use crate::services::session::RemoteSession;

/// Output proving a concurrent console holder exists. Retrying cannot help.
const CONSOLE_BUSY_MARKER: &str = "Active console session exists";

/// Guest-side login expiry; answered by re-sending the password at once
/// instead of waiting out the loop.
const LOGIN_TIMED_OUT_MARKER: &str = "Login timed out";

/// What one sample of the console output showed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleProbe {
    /// The milestone's pattern was found.
    Matched,
    /// Nothing conclusive yet; keep polling.
    Pending,
    /// A concurrent console session holds the domain.
    Busy,
}

/// Console attachment to one guest, layered over a host session.
pub struct NestedConsole<S> {
    instance: String,
    vm_prompt: String,
    credentials: Credentials,
    /// True once a login completed on this console; later attaches skip the
    /// password milestone because the guest shell is still live.
    established: bool,
    iteration_delay: Duration,
    settle: Duration,
    waiter: ConvergenceLoop<S>,
}

impl<S: OutcomeSink> NestedConsole<S> {
    pub fn new(
        instance: impl Into<String>,
        vm_prompt: impl Into<String>,
        credentials: Credentials,
        config: &SessionConfig,
        sink: Arc<S>,
    ) -> Self {
        Self {
            instance: instance.into(),
            vm_prompt: vm_prompt.into(),
            credentials,
            established: false,
            iteration_delay: Duration::from_secs(config.iteration_delay_secs),
            settle: NamedTimeout::AsyncReadSettle.duration(),
            waiter: ConvergenceLoop::new(sink),
        }
    }

    /// Delay between output samples inside each milestone wait.
    #[must_use]
    pub fn iteration_delay(mut self, delay: Duration) -> Self {
        self.iteration_delay = delay;
        self
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Attach to the guest's console through `host` and log in.
    ///
    /// A busy console raises immediately. Any other failure gets one whole
    /// retry of the milestone sequence before escalating.
    pub async fn attach(&mut self, host: &Arc<Mutex<RemoteSession>>) -> Result<(), SessionError> {
        match self.drive_milestones(host).await {
            Ok(()) => {
                self.established = true;
                Ok(())
            }
            Err(err @ SessionError::ConsoleBusy(_)) => Err(err),
            Err(err) => {
                tracing::warn!(
                    instance = %self.instance,
                    error = %err,
                    "console attach failed, retrying the sequence once"
                );
                self.drive_milestones(host).await?;
                self.established = true;
                Ok(())
            }
        }
    }

    async fn drive_milestones(&self, host: &Arc<Mutex<RemoteSession>>) -> Result<(), SessionError> {
        let domain = self.resolve_domain(host).await?;
        {
            let mut session = host.lock().await;
            session
                .send_async(&format!("virsh console {domain}"))
                .await?;
        }

        self.await_milestone(host, "console attached", None, "Connected", true)
            .await?;
        self.await_milestone(host, "login prompt", Some(String::new()), "login:", false)
            .await?;
        if self.established {
            self.await_milestone(host, "shell prompt", Some(String::new()), &self.vm_prompt, false)
                .await?;
        } else {
            let password = self.credentials.password.clone().ok_or_else(|| {
                SessionError::MissingPassword(self.credentials.username.clone())
            })?;
            self.await_milestone(
                host,
                "password prompt",
                Some(self.credentials.username.clone()),
                "[Pp]assword:",
                false,
            )
            .await?;
            self.await_milestone(host, "shell prompt", Some(password), &self.vm_prompt, false)
                .await?;
        }

        let mut session = host.lock().await;
        session.set_expected_prompt(self.vm_prompt.clone())?;
        Ok(())
    }

    /// Map the instance name to the domain name `virsh` knows it by.
    async fn resolve_domain(&self, host: &Arc<Mutex<RemoteSession>>) -> Result<String, SessionError> {
        let mut session = host.lock().await;
        let listing = session.send("virsh list --all").await?;
        let domain = listing
            .lines()
            .find(|line| line.contains(&self.instance))
            .and_then(|line| line.split_whitespace().nth(1))
            .map(str::to_string);
        domain.ok_or_else(|| SessionError::ConsoleMilestone {
            milestone: "domain resolution".to_string(),
            reason: format!("no virsh domain found for instance {}", self.instance),
        })
    }

    /// Wait for one milestone: each iteration sends the milestone's input
    /// line (if any), lets the guest's output settle, and tests everything
    /// buffered so far against the milestone's pattern.
    async fn await_milestone(
        &self,
        host: &Arc<Mutex<RemoteSession>>,
        milestone: &str,
        input: Option<String>,
        pattern: &str,
        busy_check: bool,
    ) -> Result<(), SessionError> {
        let buffer = Arc::new(StdMutex::new(String::new()));
        let password = self.credentials.password.clone();
        let settle = self.settle;
        let pattern_owned = pattern.to_string();

        let sampler = {
            let host = Arc::clone(host);
            let buffer = Arc::clone(&buffer);
            move || {
                let host = Arc::clone(&host);
                let buffer = Arc::clone(&buffer);
                let input = input.clone();
                let pattern = pattern_owned.clone();
                let password = password.clone();
                async move {
                    let mut session = host.lock().await;
                    if let Some(line) = &input {
                        session.send_async(line).await?;
                    }
                    tokio::time::sleep(settle).await;
                    let chunk = session.read_buffered().await?;

                    // Guard scoped out before the resend await below.
                    let (probe, resend_password) = {
                        let mut seen = match buffer.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        seen.push_str(&chunk);
                        if busy_check && seen.contains(CONSOLE_BUSY_MARKER) {
                            (ConsoleProbe::Busy, false)
                        } else if seen.contains(LOGIN_TIMED_OUT_MARKER) {
                            seen.clear();
                            (ConsoleProbe::Pending, true)
                        } else if prompt::find(&seen, &pattern)? {
                            (ConsoleProbe::Matched, false)
                        } else {
                            (ConsoleProbe::Pending, false)
                        }
                    };
                    if resend_password {
                        if let Some(password) = &password {
                            session.send_async(password).await?;
                        }
                    }
                    Ok(probe)
                }
            }
        };

        let spec = ConvergenceSpec::new(
            NamedTimeout::ConsoleCommand,
            format!("console milestone `{milestone}` on {}", self.instance),
            ConsoleProbe::Matched,
            sampler,
        )
        .error_state(ConsoleProbe::Busy)
        .iteration_delay(self.iteration_delay);

        match self.waiter.run(spec).await {
            Ok(_) => Ok(()),
            Err(ConvergenceError::Interrupted {
                observed: Some(ConsoleProbe::Busy),
                ..
            }) => Err(SessionError::ConsoleBusy(self.instance.clone())),
            Err(ConvergenceError::Interrupted {
                source: Some(err), ..
            }) => Err(err),
            Err(err) => Err(SessionError::ConsoleMilestone {
                milestone: milestone.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}
