//! Configuration types for the peer

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Smallest accepted protocol timeout in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 1;

/// Largest accepted protocol timeout in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 99_999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerConfigError {
    #[error("Timeout must be within {MIN_TIMEOUT_MS}..={MAX_TIMEOUT_MS} ms, got {0}")]
    TimeoutOutOfRange(u64),
}

/// Runtime configuration for a peer
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Timeout of every waiting phase, in milliseconds
    pub timeout_ms: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl PeerConfig {
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// # Errors
    ///
    /// Returns `TimeoutOutOfRange` if the timeout is outside the valid range.
    pub fn validate(&self) -> Result<(), PeerConfigError> {
        if (MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            Ok(())
        } else {
            Err(PeerConfigError::TimeoutOutOfRange(self.timeout_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_bounds() {
        assert!(PeerConfig::default().validate().is_ok());
        assert!(PeerConfig::default().with_timeout_ms(1).validate().is_ok());
        assert_eq!(
            PeerConfig::default().with_timeout_ms(0).validate(),
            Err(PeerConfigError::TimeoutOutOfRange(0))
        );
        assert!(PeerConfig::default().with_timeout_ms(100_000).validate().is_err());
    }
}
