//! # Fragment Distribution Node
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry from `FD_LOG_LEVEL` / `FD_JSON_LOGS`
//! 2. Load configuration (file from argv[1] or `FD_CONFIG`, then env)
//! 3. Assemble the tracker and peers over the in-memory bus
//! 4. Start the tracker, join the peers
//! 5. Run the demo distribution if enabled
//! 6. Shut down on Ctrl+C, or after the demo when configured to exit

use anyhow::{Context, Result};
use fd_telemetry::{init_telemetry, TelemetryConfig};
use node_runtime::{NodeConfig, NodeRuntime, CONFIG_PATH_ENV};
use std::path::PathBuf;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(&TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(PathBuf::from);
    let config = NodeConfig::resolve(path.as_deref(), |var| std::env::var(var).ok())
        .context("Failed to load configuration")?;

    let runtime = NodeRuntime::new(config)?;
    let report = runtime.run_until(shutdown_signal()).await?;

    if let Some(report) = report {
        info!(
            file = %report.file_hash,
            fragments = report.replicas.len(),
            "Demo distribution complete"
        );
    }
    info!("Node stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            // Without a signal handler the node can only stop on its own
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
