//! # Scenario Harness
//!
//! Real trackers and peers wired over one `InMemoryEventBus`, plus a tap
//! that observes every message on the bus.

use fd_03_tracker::{TrackerConfig, TrackerService};
use fd_04_peer::{
    AdmissionPolicy, InMemoryCatalog, InMemoryFragmentStorage, PeerConfig, PeerService,
};
use shared_bus::{
    BusEndpoint, DistributionEvent, EventFilter, EventTopic, InMemoryEventBus, Subscription,
};
use shared_types::{HashService, Sha256HashService};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for anything expected to happen promptly.
pub const WAIT: Duration = Duration::from_secs(2);

/// Silence that marks the end of a burst of messages.
pub const QUIET: Duration = Duration::from_millis(150);

/// Fresh bus with default capacity.
pub fn bus() -> Arc<InMemoryEventBus> {
    Arc::new(InMemoryEventBus::new())
}

pub fn hashing() -> Arc<dyn HashService> {
    Arc::new(Sha256HashService::new())
}

/// Tracker config with a small fragment size and short timeouts.
pub fn tracker_config(desired_replicas: usize, timeout_ms: u64) -> TrackerConfig {
    TrackerConfig::default()
        .with_fragment_size(1_024)
        .with_timeout_ms(timeout_ms)
        .with_desired_replicas(desired_replicas)
}

/// Tracker named `id` on `bus`, not yet started.
pub fn tracker(bus: &Arc<InMemoryEventBus>, id: &str, config: TrackerConfig) -> TrackerService {
    TrackerService::new(
        config,
        Arc::new(BusEndpoint::new(id, Arc::clone(bus))),
        hashing(),
    )
    .expect("tracker config is valid")
}

/// Peer named `id` with in-memory storage and catalog.
pub fn peer(bus: &Arc<InMemoryEventBus>, id: &str) -> PeerService {
    peer_with_policy(bus, id, Arc::new(fd_04_peer::AcceptAll))
}

pub fn peer_with_policy(
    bus: &Arc<InMemoryEventBus>,
    id: &str,
    policy: Arc<dyn AdmissionPolicy>,
) -> PeerService {
    peer_with(bus, id, PeerConfig::default().with_timeout_ms(1_000), policy)
}

pub fn peer_with(
    bus: &Arc<InMemoryEventBus>,
    id: &str,
    config: PeerConfig,
    policy: Arc<dyn AdmissionPolicy>,
) -> PeerService {
    PeerService::with_policy(
        config,
        Arc::new(BusEndpoint::new(id, Arc::clone(bus))),
        hashing(),
        Arc::new(InMemoryFragmentStorage::new()),
        Box::new(InMemoryCatalog::new()),
        policy,
    )
    .expect("peer config is valid")
}

/// Endpoint advertised by `id` in these scenarios.
pub fn endpoint(id: &str) -> String {
    format!("http://{id}.test/fragments")
}

/// Join `peer` under its scenario endpoint.
pub async fn join(peer: &PeerService) {
    let endpoint = endpoint(peer.client_id());
    tokio::time::timeout(WAIT, peer.initialize(vec![endpoint]))
        .await
        .expect("join timed out")
        .expect("join failed");
}

/// A fragment payload and its hash.
pub fn fragment(payload: &[u8]) -> (String, Vec<u8>) {
    (Sha256HashService::new().compute_digest(payload), payload.to_vec())
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Observer of every message published on a bus.
pub struct BusTap {
    subscription: Subscription,
}

impl BusTap {
    /// Start observing. Only messages published after this call are seen.
    pub fn attach(bus: &InMemoryEventBus) -> Self {
        Self {
            subscription: bus.subscribe(EventFilter::all()),
        }
    }

    /// Next message as `(sender, event)`, or `None` after `limit`.
    pub async fn next(&mut self, limit: Duration) -> Option<(String, DistributionEvent)> {
        let message = tokio::time::timeout(limit, self.subscription.recv())
            .await
            .ok()??;
        let event = message.decode().expect("bus carries well-formed events");
        Some((message.sender_id, event))
    }

    /// Skip ahead to the next message on `topic`.
    pub async fn expect(&mut self, topic: EventTopic) -> (String, DistributionEvent) {
        loop {
            match self.next(WAIT).await {
                Some((sender, event)) if event.topic() == topic => return (sender, event),
                Some(_) => continue,
                None => panic!("no {topic} message within {WAIT:?}"),
            }
        }
    }

    /// Every message published within `window`.
    pub async fn collect_for(&mut self, window: Duration) -> Vec<(String, DistributionEvent)> {
        let deadline = tokio::time::Instant::now() + window;
        let mut seen = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return seen;
            }
            match self.next(remaining).await {
                Some(entry) => seen.push(entry),
                None => return seen,
            }
        }
    }

    /// Every message until the bus stays quiet for [`QUIET`].
    pub async fn drain(&mut self) -> Vec<(String, DistributionEvent)> {
        let mut seen = Vec::new();
        while let Some(entry) = self.next(QUIET).await {
            seen.push(entry);
        }
        seen
    }
}

/// Topics of `messages`, in order.
pub fn topics(messages: &[(String, DistributionEvent)]) -> Vec<EventTopic> {
    messages.iter().map(|(_, event)| event.topic()).collect()
}
