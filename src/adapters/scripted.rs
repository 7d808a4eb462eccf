//! Scripted in-memory transport for tests.
//!
//! Plays back a script instead of talking to real hosts: connect attempts
//! succeed or fail in a preconfigured order, channels answer commands from
//! a response table and reveal buffered output chunk by chunk. Everything
//! attempted is logged so tests can assert on the exact hop sequence.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::ports::{CliChannel, CliTransport, ConnectParams, TransportError};

/// What one scripted connect attempt should do.
pub enum ConnectScript {
    /// Hand out a channel built from the given script.
    Succeed(ChannelScript),
    Fail(TransportError),
}

/// Canned behavior for one channel.
#[derive(Default, Clone)]
pub struct ChannelScript {
    /// Prompt text reported as matched right after connect.
    pub initial_prompt: String,
    /// Exact command -> queued (output, prompt matched afterwards) pairs.
    /// The last pair scripted for a command repeats once the queue drains.
    pub responses: HashMap<String, VecDeque<(String, String)>>,
    /// Output revealed one entry per `read_buffered` call.
    pub buffered: VecDeque<String>,
}

impl ChannelScript {
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            initial_prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Script a response and the prompt the channel sits at afterwards.
    #[must_use]
    pub fn respond(
        mut self,
        command: impl Into<String>,
        output: impl Into<String>,
        next_prompt: impl Into<String>,
    ) -> Self {
        self.responses
            .entry(command.into())
            .or_default()
            .push_back((output.into(), next_prompt.into()));
        self
    }

    /// Queue a chunk of asynchronous output.
    #[must_use]
    pub fn buffer(mut self, chunk: impl Into<String>) -> Self {
        self.buffered.push_back(chunk.into());
        self
    }
}

#[derive(Default)]
struct TransportState {
    script: VecDeque<ConnectScript>,
    attempts: Vec<ConnectParams>,
}

/// Transport double that consumes its connect script in order.
#[derive(Default, Clone)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: ConnectScript) {
        lock(&self.state).script.push_back(step);
    }

    /// Every connect attempt made so far, in order.
    pub fn attempts(&self) -> Vec<ConnectParams> {
        lock(&self.state).attempts.clone()
    }
}

#[async_trait]
impl CliTransport for ScriptedTransport {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn CliChannel>, TransportError> {
        let step = {
            let mut state = lock(&self.state);
            state.attempts.push(params);
            state.script.pop_front()
        };
        match step {
            Some(ConnectScript::Succeed(script)) => Ok(Box::new(ScriptedChannel::new(script))),
            Some(ConnectScript::Fail(err)) => Err(err),
            None => Err(TransportError::Protocol(
                "connect script exhausted".to_string(),
            )),
        }
    }
}

/// Channel double answering from a [`ChannelScript`].
pub struct ScriptedChannel {
    script: ChannelScript,
    matched_prompt: String,
    expected_prompt: String,
    sent_async: Vec<String>,
    connected: bool,
}

impl ScriptedChannel {
    pub fn new(script: ChannelScript) -> Self {
        let matched_prompt = script.initial_prompt.clone();
        Self {
            script,
            matched_prompt,
            expected_prompt: String::new(),
            sent_async: Vec::new(),
            connected: true,
        }
    }

    /// Commands sent asynchronously so far.
    pub fn sent_async(&self) -> &[String] {
        &self.sent_async
    }
}

#[async_trait]
impl CliChannel for ScriptedChannel {
    async fn send(&mut self, command: &str) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::ChannelClosed);
        }
        let Some(queue) = self.script.responses.get_mut(command) else {
            return Err(TransportError::Protocol(format!(
                "no scripted response for command {command:?}"
            )));
        };
        let (output, next_prompt) = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
        .ok_or_else(|| {
            TransportError::Protocol(format!("no scripted response for command {command:?}"))
        })?;
        self.matched_prompt = next_prompt;
        Ok(output)
    }

    async fn send_async(&mut self, command: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::ChannelClosed);
        }
        self.sent_async.push(command.to_string());
        Ok(())
    }

    async fn read_buffered(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::ChannelClosed);
        }
        Ok(self.script.buffered.pop_front().unwrap_or_default())
    }

    fn set_expected_prompt(&mut self, regex: &str) {
        self.expected_prompt = regex.to_string();
    }

    fn matched_prompt(&self) -> String {
        self.matched_prompt.clone()
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }
}

fn lock(state: &Arc<Mutex<TransportState>>) -> std::sync::MutexGuard<'_, TransportState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
