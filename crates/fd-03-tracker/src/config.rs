//! Configuration types for the tracker

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Smallest accepted protocol timeout in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 1;

/// Largest accepted protocol timeout in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 99_999;

/// Configuration errors, fatal at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerConfigError {
    #[error("Fragment size must be positive, got {0}")]
    InvalidFragmentSize(i64),

    #[error("Timeout must be within {MIN_TIMEOUT_MS}..={MAX_TIMEOUT_MS} ms, got {0}")]
    TimeoutOutOfRange(u64),

    #[error("Desired replica count must be at least 1, got {0}")]
    InvalidReplicaCount(usize),
}

/// Runtime configuration for the tracker
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum fragment size in bytes; peers must agree on it to join
    pub fragment_size: i64,

    /// Timeout of every waiting phase, in milliseconds
    pub timeout_ms: u64,

    /// Number of volunteers that ends the request phase early
    pub desired_replicas: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fragment_size: 80_000,
            timeout_ms: 5_000,
            desired_replicas: 3,
        }
    }
}

impl TrackerConfig {
    #[must_use]
    pub fn with_fragment_size(mut self, fragment_size: i64) -> Self {
        self.fragment_size = fragment_size;
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_desired_replicas(mut self, desired_replicas: usize) -> Self {
        self.desired_replicas = desired_replicas;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// # Errors
    ///
    /// Returns the first out-of-range setting.
    pub fn validate(&self) -> Result<(), TrackerConfigError> {
        if self.fragment_size <= 0 {
            return Err(TrackerConfigError::InvalidFragmentSize(self.fragment_size));
        }
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(TrackerConfigError::TimeoutOutOfRange(self.timeout_ms));
        }
        if self.desired_replicas == 0 {
            return Err(TrackerConfigError::InvalidReplicaCount(self.desired_replicas));
        }
        Ok(())
    }
}
