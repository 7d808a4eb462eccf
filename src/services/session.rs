//! Interactive remote session over a CLI transport.
//!
//! A session owns at most one transport channel and tracks where in the
//! connect lifecycle it is. It knows nothing about routing: hop selection
//! and fallback live in [`crate::services::hop_router`], which drives a
//! session one hop at a time.

use std::sync::Arc;

use crate::domain::errors::SessionError;
use crate::domain::models::prompt::{
    self, expected_prompt_for, CONTINUE_PROMPT, PASSWORD_PROMPT,
};
use crate::domain::models::{Credentials, Hop, SessionConfig, TargetKind, TransportKind};
use crate::domain::ports::{CliChannel, CliTransport, ConnectParams, TransportError};

/// Rounds of interactive password/continue questions answered per hop
/// before negotiation is declared stuck.
const MAX_NEGOTIATION_ROUNDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    PromptNegotiation,
    Connected,
}

pub struct RemoteSession {
    target: TargetKind,
    transport_kind: TransportKind,
    transport: Arc<dyn CliTransport>,
    channel: Option<Box<dyn CliChannel>>,
    state: SessionState,
    hostname: Option<String>,
    credentials: Credentials,
    /// Swapped in for exactly one password prompt, then discarded.
    next_password: Option<String>,
    expected_prompt: String,
    send_timeout_ms: u64,
    ssh_connect_timeout_secs: u64,
}

impl RemoteSession {
    pub fn new(
        target: TargetKind,
        transport_kind: TransportKind,
        transport: Arc<dyn CliTransport>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            target,
            transport_kind,
            transport,
            channel: None,
            state: SessionState::Disconnected,
            hostname: None,
            credentials: Credentials::passwordless(""),
            next_password: None,
            expected_prompt: String::new(),
            send_timeout_ms: config.send_timeout_ms,
            ssh_connect_timeout_secs: config.ssh_connect_timeout_secs,
        }
    }

    pub fn target(&self) -> TargetKind {
        self.target
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Hostname learned after the last successful connect.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Queue a password to answer the next password prompt instead of the
    /// hop's configured one. Consumed by the first prompt that needs it.
    pub fn set_next_password(&mut self, password: impl Into<String>) {
        self.next_password = Some(password.into());
    }

    /// Connect this session through a single hop: open the channel, answer
    /// interactive questions until a shell prompt is reached, then learn the
    /// target's hostname.
    ///
    /// Transport-level failures surface as [`SessionError::Transport`] so the
    /// router can decide whether a fallback hop may recover.
    pub async fn connect_hop(&mut self, hop: &Hop) -> Result<(), SessionError> {
        self.disconnect().await;
        self.state = SessionState::Connecting;
        self.credentials = hop.credentials.clone();
        self.expected_prompt = expected_prompt_for(&hop.role_prompt);

        tracing::info!(
            target_kind = %self.target,
            address = %hop.address,
            port = hop.port,
            username = %hop.credentials.username,
            "connecting"
        );
        let params = ConnectParams {
            address: hop.address.clone(),
            username: hop.credentials.username.clone(),
            password: hop.credentials.password.clone(),
            port: hop.port,
            expected_prompt: self.expected_prompt.clone(),
            send_timeout_ms: self.send_timeout_ms,
        };
        let channel = match self.transport.connect(params).await {
            Ok(channel) => channel,
            Err(err) => {
                self.state = SessionState::Disconnected;
                return Err(SessionError::Transport(err));
            }
        };
        self.channel = Some(channel);

        self.state = SessionState::PromptNegotiation;
        if let Err(err) = self.answer_interactive_prompts().await {
            self.disconnect().await;
            return Err(err);
        }

        match self.resolve_hostname().await {
            Ok(hostname) => {
                tracing::info!(target_kind = %self.target, hostname = %hostname, "connected");
                self.hostname = Some(hostname);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(err) => {
                self.disconnect().await;
                Err(err)
            }
        }
    }

    /// Answer password and continue? questions until the matched prompt is
    /// a shell prompt.
    async fn answer_interactive_prompts(&mut self) -> Result<(), SessionError> {
        for _ in 0..MAX_NEGOTIATION_ROUNDS {
            let matched = self.require_channel()?.matched_prompt();
            if prompt::find(&matched, PASSWORD_PROMPT)? {
                let password = match self.next_password.take() {
                    Some(password) => password,
                    None => self.credentials.password.clone().ok_or_else(|| {
                        SessionError::MissingPassword(self.credentials.username.clone())
                    })?,
                };
                tracing::debug!(target_kind = %self.target, "answering password prompt");
                self.require_channel()?.send(&password).await?;
            } else if prompt::find(&matched, CONTINUE_PROMPT)? {
                tracing::debug!(target_kind = %self.target, "answering continue prompt");
                self.require_channel()?.send("yes").await?;
            } else {
                return Ok(());
            }
        }
        Err(SessionError::NegotiationStalled {
            target: self.target,
            rounds: MAX_NEGOTIATION_ROUNDS,
        })
    }

    async fn resolve_hostname(&mut self) -> Result<String, SessionError> {
        let output = self.require_channel()?.send("hostname").await?;
        let hostname = strip_echo("hostname", &output)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(hostname)
    }

    /// Hop onwards from the connected host by running `ssh` inside the
    /// session, reusing the normal prompt negotiation for the inner login.
    ///
    /// The channel stays open but now fronts the new host; the session's
    /// credentials, expected prompt and hostname all move to the hop.
    pub async fn hop_within(&mut self, hop: &Hop) -> Result<(), SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::NotConnected(self.target));
        }
        self.set_expected_prompt(expected_prompt_for(&hop.role_prompt))?;
        self.credentials = hop.credentials.clone();

        let command = format!(
            "ssh -o ConnectTimeout={} {}@{}",
            self.ssh_connect_timeout_secs, hop.credentials.username, hop.address
        );
        tracing::info!(target_kind = %self.target, address = %hop.address, "hopping within session");
        let output = self.require_channel()?.send(&command).await?;
        if output.contains("No route to host") || output.contains("Connection refused") {
            self.disconnect().await;
            return Err(SessionError::Transport(TransportError::ConnectionRefused {
                address: hop.address.clone(),
                port: hop.port,
            }));
        }

        self.state = SessionState::PromptNegotiation;
        if let Err(err) = self.answer_interactive_prompts().await {
            self.disconnect().await;
            return Err(err);
        }
        match self.resolve_hostname().await {
            Ok(hostname) => {
                self.hostname = Some(hostname);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(err) => {
                self.disconnect().await;
                Err(err)
            }
        }
    }

    /// Send a command and return its output with the command echo removed.
    pub async fn send(&mut self, command: &str) -> Result<String, SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::NotConnected(self.target));
        }
        let output = self.require_channel()?.send(command).await?;
        Ok(strip_echo(command, &output))
    }

    /// Send a command without waiting for a prompt match.
    pub async fn send_async(&mut self, command: &str) -> Result<(), SessionError> {
        Ok(self.require_channel()?.send_async(command).await?)
    }

    /// Read whatever output the channel has buffered.
    pub async fn read_buffered(&mut self) -> Result<String, SessionError> {
        Ok(self.require_channel()?.read_buffered().await?)
    }

    pub fn set_expected_prompt(&mut self, regex: impl Into<String>) -> Result<(), SessionError> {
        let regex = regex.into();
        self.require_channel()?.set_expected_prompt(&regex);
        self.expected_prompt = regex;
        Ok(())
    }

    pub fn expected_prompt(&self) -> &str {
        &self.expected_prompt
    }

    /// Concrete prompt text the channel most recently matched.
    pub fn matched_prompt(&self) -> Option<String> {
        self.channel.as_ref().map(|channel| channel.matched_prompt())
    }

    /// Whether the channel is still open and answering as the host we
    /// learned at connect time.
    pub async fn is_connected(&mut self) -> bool {
        if self.state != SessionState::Connected || self.channel.is_none() {
            return false;
        }
        let Some(expected) = self.hostname.clone() else {
            return false;
        };
        match self.resolve_hostname().await {
            Ok(hostname) => hostname == expected,
            Err(_) => false,
        }
    }

    pub async fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            tracing::debug!(target_kind = %self.target, "disconnecting");
            channel.disconnect().await;
        }
        self.state = SessionState::Disconnected;
        self.hostname = None;
    }

    fn require_channel(&mut self) -> Result<&mut Box<dyn CliChannel>, SessionError> {
        self.channel
            .as_mut()
            .ok_or(SessionError::NotConnected(self.target))
    }
}

/// Remove the leading command echo a CLI channel reflects back before the
/// real output.
fn strip_echo(command: &str, output: &str) -> String {
    match output.split_once('\n') {
        Some((first, rest)) if first.trim_end() == command => rest.to_string(),
        _ => output.to_string(),
    }
}
