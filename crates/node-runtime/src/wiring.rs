//! # Network Wiring
//!
//! Assembles one tracker and its peers over a shared in-memory event bus.
//!
//! ```text
//!   TrackerService ── BusEndpoint("tracker") ──┐
//!   PeerService    ── BusEndpoint("peer-1")  ──┼── InMemoryEventBus
//!   PeerService    ── BusEndpoint("peer-N")  ──┘
//! ```
//!
//! Every endpoint spawns its receive pump on construction, so a `Network`
//! must be assembled inside a Tokio runtime.

use crate::config::{NodeConfig, PeerSection};
use anyhow::{Context, Result};
use fd_03_tracker::TrackerService;
use fd_04_peer::{
    AcceptAll, FragmentStorage, InMemoryCatalog, InMemoryFragmentStorage, JsonFileCatalog,
    PersistentCatalog, PeerService,
};
use shared_bus::{BusEndpoint, InMemoryEventBus};
use shared_types::{HashService, Sha256HashService};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Client id of the tracker on the bus.
pub const TRACKER_ID: &str = "tracker";

/// A peer together with the endpoint it advertises.
#[derive(Clone)]
pub struct PeerNode {
    pub service: PeerService,
    pub endpoint: String,
}

/// All nodes sharing one bus.
pub struct Network {
    bus: Arc<InMemoryEventBus>,
    tracker: TrackerService,
    peers: Vec<PeerNode>,
}

impl Network {
    /// Build the tracker and `config.peer.count` peers. Nothing is
    /// published until [`Network::start`].
    ///
    /// # Errors
    ///
    /// Fails if a service rejects its configuration or a catalog cannot
    /// be opened.
    pub fn assemble(config: &NodeConfig) -> Result<Self> {
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.bus.capacity));
        let hashing: Arc<dyn HashService> = Arc::new(Sha256HashService::new());

        let tracker = TrackerService::with_seen_cache(
            config.tracker.clone(),
            Arc::new(BusEndpoint::new(TRACKER_ID, Arc::clone(&bus))),
            Arc::clone(&hashing),
            config.dedup.seen_cache(),
        )
        .context("Failed to create tracker")?;

        let peers = (0..config.peer.count)
            .map(|index| {
                let id = PeerSection::peer_id(index);
                Self::assemble_peer(config, &id, &bus, &hashing)
                    .with_context(|| format!("Failed to create {id}"))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(peers = peers.len(), capacity = bus.capacity(), "Network assembled");
        Ok(Self { bus, tracker, peers })
    }

    fn assemble_peer(
        config: &NodeConfig,
        id: &str,
        bus: &Arc<InMemoryEventBus>,
        hashing: &Arc<dyn HashService>,
    ) -> Result<PeerNode> {
        let catalog: Box<dyn PersistentCatalog> = match &config.peer.catalog_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                Box::new(JsonFileCatalog::open(dir.join(format!("{id}.json")))?)
            }
            None => Box::new(InMemoryCatalog::new()),
        };
        let storage: Arc<dyn FragmentStorage> = Arc::new(InMemoryFragmentStorage::new());

        let service = PeerService::with_seen_cache(
            config.peer.service_config(),
            Arc::new(BusEndpoint::new(id, Arc::clone(bus))),
            Arc::clone(hashing),
            storage,
            catalog,
            Arc::new(AcceptAll),
            config.dedup.seen_cache(),
        )?;
        Ok(PeerNode {
            service,
            endpoint: config.peer.endpoint_for(id),
        })
    }

    /// Start the tracker, then join every peer concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first tracker or peer failure.
    pub async fn start(&self) -> Result<()> {
        self.tracker.start().await.context("Tracker failed to start")?;

        let mut joins = JoinSet::new();
        for peer in &self.peers {
            let service = peer.service.clone();
            let endpoints = vec![peer.endpoint.clone()];
            joins.spawn(async move {
                let id = service.client_id().to_string();
                service.initialize(endpoints).await.map_err(|e| (id, e))
            });
        }
        while let Some(joined) = joins.join_next().await {
            joined
                .context("Peer join task panicked")?
                .map_err(|(id, e)| anyhow::anyhow!("{id} failed to join: {e}"))?;
        }

        info!(peers = self.peers.len(), "All peers joined");
        Ok(())
    }

    /// Shut every peer down, then the tracker. Failures are logged.
    pub async fn shutdown(&self) {
        for peer in &self.peers {
            if let Err(e) = peer.service.shutdown().await {
                warn!(peer = %peer.service.client_id(), error = %e, "Peer shutdown failed");
            }
        }
        if let Err(e) = self.tracker.shutdown().await {
            warn!(error = %e, "Tracker shutdown failed");
        }
        info!("Network stopped");
    }

    /// Read a fragment from the first peer storing it.
    #[must_use]
    pub fn fetch_fragment(&self, hash: &str) -> Option<Vec<u8>> {
        self.peers
            .iter()
            .find_map(|peer| peer.service.read_fragment(hash).ok())
    }

    #[must_use]
    pub fn tracker(&self) -> &TrackerService {
        &self.tracker
    }

    #[must_use]
    pub fn peers(&self) -> &[PeerNode] {
        &self.peers
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fd_03_tracker::TrackerPhase;
    use fd_04_peer::PeerPhase;

    fn small_config(peers: usize) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.peer.count = peers;
        config.tracker.timeout_ms = 1_000;
        config.peer.timeout_ms = 1_000;
        config
    }

    #[tokio::test]
    async fn test_start_registers_every_peer() {
        let network = Network::assemble(&small_config(3)).unwrap();
        network.start().await.unwrap();

        let registered: Vec<String> = network
            .tracker()
            .registered_peers()
            .await
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(registered, vec!["peer-1", "peer-2", "peer-3"]);

        for peer in network.peers() {
            assert_eq!(peer.service.phase().await, PeerPhase::Idle);
        }
        network.shutdown().await;
        assert_eq!(network.tracker().phase().await, TrackerPhase::Disposed);
    }

    #[tokio::test]
    async fn test_unopenable_catalog_fails_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("catalogs");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut config = small_config(1);
        config.peer.catalog_dir = Some(blocker);
        assert!(Network::assemble(&config).is_err());
    }
}
