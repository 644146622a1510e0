//! Connection and fan-out tuning

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Sync connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Seconds a new connection has to send `authenticate`
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Outbound frames buffered per connection before fan-out drops
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl SyncConfig {
    /// Get the handshake timeout as Duration
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=120).contains(&self.handshake_timeout_secs) {
            return Err(ValidationError::InvalidHandshakeTimeout);
        }
        if self.outbound_buffer == 0 {
            return Err(ValidationError::InvalidOutboundBuffer);
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

fn default_handshake_timeout() -> u64 {
    15
}

fn default_outbound_buffer() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.handshake_timeout(), Duration::from_secs(15));
        assert_eq!(config.outbound_buffer, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_handshake_timeout_bounds() {
        for secs in [0, 121] {
            let config = SyncConfig {
                handshake_timeout_secs: secs,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{} should be rejected", secs);
        }
    }

    #[test]
    fn test_zero_buffer_is_rejected() {
        let config = SyncConfig {
            outbound_buffer: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidOutboundBuffer)
        ));
    }
}
