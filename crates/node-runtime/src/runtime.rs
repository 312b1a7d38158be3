//! Node lifecycle: start, optional demo, wait, shutdown.

use crate::config::NodeConfig;
use crate::demo::{self, DemoReport};
use crate::wiring::Network;
use anyhow::Result;
use shared_types::Sha256HashService;
use std::future::Future;
use tracing::{error, info};

/// The runtime orchestrating one network.
pub struct NodeRuntime {
    config: NodeConfig,
    network: Network,
}

impl NodeRuntime {
    /// Assemble the network described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if any node cannot be created.
    pub fn new(config: NodeConfig) -> Result<Self> {
        info!(
            fragment_size = config.tracker.fragment_size,
            peers = config.peer.count,
            desired_replicas = config.tracker.desired_replicas,
            "Creating fragment distribution node"
        );
        let network = Network::assemble(&config)?;
        Ok(Self { config, network })
    }

    /// Start the network and run until `shutdown` resolves, or until the
    /// demo completes when it is configured to exit.
    ///
    /// The network is always shut down before returning.
    ///
    /// # Errors
    ///
    /// Returns the startup or demo failure.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<Option<DemoReport>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let outcome = tokio::select! {
            outcome = self.serve() => outcome,
            () = &mut shutdown => {
                info!("Shutdown requested");
                Ok(None)
            }
        };
        if let Err(e) = &outcome {
            error!(error = %e, "Node failed");
        }
        self.network.shutdown().await;
        outcome
    }

    async fn serve(&self) -> Result<Option<DemoReport>> {
        self.network.start().await?;
        if !self.config.demo.enabled {
            info!("Node running");
            return std::future::pending().await;
        }

        let hashing = Sha256HashService::new();
        let report = demo::run(&self.network, &self.config.demo, &hashing).await?;
        if self.config.demo.exit_when_done {
            return Ok(Some(report));
        }
        info!("Demo finished; node running");
        std::future::pending().await
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }
}
