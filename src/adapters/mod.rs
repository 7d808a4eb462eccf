//! Adapters: concrete implementations of the domain ports.

pub mod scripted;

pub use scripted::{ChannelScript, ConnectScript, ScriptedChannel, ScriptedTransport};
