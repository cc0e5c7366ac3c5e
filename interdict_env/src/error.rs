//! Error types for the Interdict environment abstraction.

use thiserror::Error;

/// Delivery errors raised by push channels.
///
/// These never travel further than the dispatch loop: a failed channel is
/// evicted and the error is logged.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The receiving side of the channel has gone away
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl EnvError {
    /// Creates a channel-closed error.
    pub fn closed(channel: impl std::fmt::Display) -> Self {
        Self::ChannelClosed(channel.to_string())
    }
}
