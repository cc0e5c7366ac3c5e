//! Common types for the Interdict environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a control-dashboard client.
///
/// Dashboards connect anonymously, so ids are UUID v4 unless the transport
/// supplies its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Creates a new random ClientId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic ClientId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Which channel set a delivery is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelTarget {
    /// A single officer's channel, keyed by officer id
    Officer(String),

    /// Every registered control-dashboard channel
    Control,
}

impl std::fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelTarget::Officer(id) => write!(f, "officer:{}", id),
            ChannelTarget::Control => write!(f, "control:*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_from_seed_is_deterministic() {
        assert_eq!(ClientId::from_seed(7), ClientId::from_seed(7));
        assert_ne!(ClientId::from_seed(7), ClientId::from_seed(8));
    }

    #[test]
    fn test_channel_target_display() {
        assert_eq!(ChannelTarget::Officer("OFF-1".into()).to_string(), "officer:OFF-1");
        assert_eq!(ChannelTarget::Control.to_string(), "control:*");
    }
}
