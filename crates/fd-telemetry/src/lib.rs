//! # FD Telemetry
//!
//! Structured logging for fragment distribution nodes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fd_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     // Every crate logs through `tracing` from here on
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FD_LOG_LEVEL` | `RUST_LOG`, then `info` | Filter directives |
//! | `FD_JSON_LOGS` | `false` | JSON instead of human-readable lines |
//! | `FD_SERVICE_NAME` | `fragment-distribution` | Service name logged at startup |

mod config;
mod subscriber;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// - `InvalidFilter` if `log_level` is not a valid filter
/// - `AlreadyInitialized` if a global subscriber is already set
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    subscriber::install(config)?;
    tracing::info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );
    Ok(())
}
