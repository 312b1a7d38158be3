//! # Tracker Service
//!
//! The tracker is the single authority over the network's distribution map.
//! It admits peers, publishes file metadata and fans fragments out.
//!
//! ## Phases
//!
//! ```text
//!                 JoinRequested                      JoinSucceeded / JoinFailed / timeout
//!   Idle ──────────────────────────> WaitForJoinResponse ─────────────────────────> Idle
//!    │
//!    │ distribute_fragment           desired replicas / timeout
//!    └────────────> WaitForDistributionRequests ─────────────> WaitForDistributionDelivery
//!                                                                      │
//!                                      all outcomes / timeout          │
//!   Idle <─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every transition runs under a write session of the coordinator lock.
//! Outbound publishes run under a shared session so read queries are never
//! blocked by network I/O, and a publish failure rolls the transition back.

use crate::config::TrackerConfig;
use crate::domain::{
    normalize_declarations, plan_join, PendingDelivery, PendingJoin, PendingRequests,
    TrackerCore, TrackerPhase, TrackerState, Waiting,
};
use crate::error::{Result, TrackerError};
use async_trait::async_trait;
use fd_01_distribution_map::{
    DistributionMap, DistributionObserver, FragmentedFileInfo, PeerInfo,
};
use fd_02_coordinator_lock::{CoordinatorLock, TimeoutHandle, WriteSession};
use shared_bus::{
    publish_event, DistributionEvent, EventDispatcher, EventHandler, SeenEventCache,
    TransportEndpoint,
};
use shared_types::{
    ClientJoinAccepted, ClientJoinDenied, ClientJoinDeniedCode, ClientJoinRequested,
    ClientRegistered, FileInfoPublished, FragmentDistributionDelivered, FragmentDistributionEnded,
    FragmentDistributionStarted, HashService, InvalidHashError, TrackerGoodbye, TrackerHello,
};
use std::collections::BTreeSet;
use std::future::Future;
use std::mem;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reason sent to a peer whose join confirmation never arrived.
pub const JOIN_TIMEOUT_REASON: &str = "Timeout exceeded";

/// Tracker node. Cheap to clone; clones share one state machine.
#[derive(Clone)]
pub struct TrackerService {
    inner: Arc<TrackerInner>,
    dispatcher: Arc<EventDispatcher<TrackerInner>>,
}

struct TrackerInner {
    config: TrackerConfig,
    hashing: Arc<dyn HashService>,
    transport: Arc<dyn TransportEndpoint>,
    core: CoordinatorLock<TrackerCore>,
    /// Handed to timer continuations so they never keep the tracker alive.
    self_ref: Weak<TrackerInner>,
}

impl TrackerService {
    /// Create a tracker over `transport`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Config` if `config` is out of range.
    pub fn new(
        config: TrackerConfig,
        transport: Arc<dyn TransportEndpoint>,
        hashing: Arc<dyn HashService>,
    ) -> Result<Self> {
        Self::with_seen_cache(config, transport, hashing, SeenEventCache::new())
    }

    /// Create a tracker with a custom duplicate-suppression cache.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Config` if `config` is out of range.
    pub fn with_seen_cache(
        config: TrackerConfig,
        transport: Arc<dyn TransportEndpoint>,
        hashing: Arc<dyn HashService>,
        seen: SeenEventCache,
    ) -> Result<Self> {
        config.validate()?;
        let node_id = transport.client_id().to_string();

        info!(
            node = %node_id,
            fragment_size = config.fragment_size,
            timeout_ms = config.timeout_ms,
            desired_replicas = config.desired_replicas,
            "Tracker created"
        );

        let inner = Arc::new_cyclic(|self_ref| TrackerInner {
            config,
            hashing,
            transport,
            core: CoordinatorLock::new(TrackerCore::new()),
            self_ref: self_ref.clone(),
        });
        let dispatcher = Arc::new(EventDispatcher::new(node_id, Arc::clone(&inner), seen));
        Ok(Self { inner, dispatcher })
    }

    /// Start receiving events and announce the tracker.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the callback cannot be registered, or a
    /// publish error if `TrackerHello` cannot be sent.
    pub async fn start(&self) -> Result<()> {
        self.dispatcher.attach(self.inner.transport.as_ref())?;
        self.inner
            .publish(DistributionEvent::TrackerHello(TrackerHello::new()))
            .await?;
        info!(node = %self.client_id(), "Tracker started");
        Ok(())
    }

    /// Abort any in-flight phase, announce departure and dispose.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a publish error if `TrackerGoodbye` cannot be sent. The
    /// tracker is disposed either way.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }

    /// Announce a file's metadata to the network.
    ///
    /// # Errors
    ///
    /// - `InvalidFileSize` if `size` is not positive
    /// - `InvalidHash` if any hash is malformed
    /// - `DuplicateFile` if the file is already known
    /// - `Publish` if the announcement fails; the file is not kept
    pub async fn publish_file_info(
        &self,
        hash: &str,
        size: i64,
        fragment_sequence: &[String],
    ) -> Result<()> {
        self.inner.publish_file_info(hash, size, fragment_sequence).await
    }

    /// Replicate one fragment onto volunteering peers.
    ///
    /// Resolves with the fetch URIs of every peer that confirmed storage.
    ///
    /// # Errors
    ///
    /// - `EmptyFragment`, `FragmentTooLarge`, `InvalidHash`, `HashMismatch`
    ///   when the input is rejected
    /// - `DuplicateFragment` if the fragment is already distributed
    /// - `NoVolunteers` / `NoConfirmations` when no peer took the fragment
    /// - `Publish` if an announcement fails
    /// - `Aborted` / `Disposed` on shutdown
    pub async fn distribute_fragment(&self, hash: &str, data: Vec<u8>) -> Result<Vec<String>> {
        self.inner.distribute_fragment(hash, data).await
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.inner.transport.client_id()
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub async fn phase(&self) -> TrackerPhase {
        self.inner.core.read().await.state.phase()
    }

    /// Registered peers, ordered by id.
    pub async fn registered_peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.inner.core.read().await.map.peers().cloned().collect();
        peers.sort_by(|a, b| a.id().cmp(b.id()));
        peers
    }

    /// Copy of the current distribution map.
    pub async fn snapshot(&self) -> DistributionMap {
        self.inner.core.read().await.map.clone()
    }
}

#[async_trait]
impl DistributionObserver for TrackerService {
    async fn fragment_size(&self) -> Option<i64> {
        Some(self.inner.config.fragment_size)
    }

    async fn distribution_endpoints(&self) -> Vec<String> {
        let session = self.inner.core.read().await;
        session.map.endpoints().iter().cloned().collect()
    }

    async fn exists_file(&self, hash: &str) -> bool {
        let Some(hash) = self.inner.hashing.try_normalize(hash) else {
            return false;
        };
        self.inner.core.read().await.map.contains_file(&hash)
    }

    async fn exists_fragment(&self, hash: &str) -> bool {
        let Some(hash) = self.inner.hashing.try_normalize(hash) else {
            return false;
        };
        self.inner.core.read().await.map.contains_fragment(&hash)
    }

    async fn try_get_file_info(&self, hash: &str) -> Option<FragmentedFileInfo> {
        let hash = self.inner.hashing.try_normalize(hash)?;
        self.inner.core.read().await.map.try_get_file(&hash).cloned()
    }

    async fn fragment_distribution(&self, hash: &str) -> Option<Vec<String>> {
        let hash = self.inner.hashing.try_normalize(hash)?;
        self.inner.core.read().await.map.fragment_uris(&hash)
    }
}

#[async_trait]
impl EventHandler for TrackerInner {
    type Error = TrackerError;

    async fn handle(&self, sender_id: &str, event: DistributionEvent) -> Result<()> {
        if sender_id == self.transport.client_id() {
            return Ok(());
        }
        match event {
            DistributionEvent::ClientJoinRequested(request) => {
                self.on_join_requested(sender_id, request).await
            }
            DistributionEvent::ClientJoinSucceeded(_) => self.on_join_succeeded(sender_id).await,
            DistributionEvent::ClientJoinFailed(_) => {
                self.on_join_failed(sender_id).await;
                Ok(())
            }
            DistributionEvent::ClientGoodbye(_) => {
                self.on_client_goodbye(sender_id).await;
                Ok(())
            }
            DistributionEvent::FragmentDistributionRequested(e) => {
                self.on_distribution_requested(sender_id, &e.hash).await;
                Ok(())
            }
            DistributionEvent::FragmentDistributionObtained(e) => {
                self.on_distribution_outcome(sender_id, &e.hash, true).await;
                Ok(())
            }
            DistributionEvent::FragmentDistributionFailed(e) => {
                self.on_distribution_outcome(sender_id, &e.hash, false).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl TrackerInner {
    async fn publish(&self, event: DistributionEvent) -> Result<()> {
        publish_event(self.transport.as_ref(), &event).await?;
        Ok(())
    }

    fn normalize(&self, hash: &str) -> Result<String> {
        self.hashing
            .try_normalize(hash)
            .ok_or_else(|| InvalidHashError::new(hash, self.hashing.algorithm_name()).into())
    }

    /// Run `action` after the configured timeout unless the handle is dropped.
    fn schedule_timeout<F, Fut>(&self, action: F) -> TimeoutHandle
    where
        F: FnOnce(Arc<TrackerInner>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tracker = self.self_ref.clone();
        TimeoutHandle::schedule(self.config.timeout(), async move {
            if let Some(tracker) = tracker.upgrade() {
                action(tracker).await;
            }
        })
    }

    // =========================================================================
    // JOIN HANDSHAKE
    // =========================================================================

    async fn deny(
        &self,
        client: &str,
        code: ClientJoinDeniedCode,
        reason: Option<String>,
    ) -> Result<()> {
        info!(
            peer = %client,
            code = %code,
            reason = reason.as_deref().unwrap_or_default(),
            "Join denied"
        );
        self.publish(DistributionEvent::ClientJoinDenied(ClientJoinDenied::new(
            client, code, reason,
        )))
        .await
    }

    /// First reason to refuse `request`, checked in code order.
    fn admission_check(
        &self,
        map: &DistributionMap,
        sender: &str,
        request: &ClientJoinRequested,
    ) -> Option<(ClientJoinDeniedCode, String)> {
        if let Some(size) = request.fragment_size {
            if size != self.config.fragment_size {
                return Some((
                    ClientJoinDeniedCode::WrongFragmentSize,
                    format!(
                        "Fragment size {size} differs from {}",
                        self.config.fragment_size
                    ),
                ));
            }
        }
        let algorithm = self.hashing.algorithm_name();
        if !request.hash_algorithm.eq_ignore_ascii_case(algorithm) {
            return Some((
                ClientJoinDeniedCode::WrongHashAlgorithm,
                format!("Hash algorithm {} differs from {algorithm}", request.hash_algorithm),
            ));
        }
        for endpoint in &request.endpoints {
            if let Some(owner) = map
                .peer_with_endpoint(endpoint)
                .filter(|peer| peer.id() != sender)
            {
                return Some((
                    ClientJoinDeniedCode::EndpointConflict,
                    format!("Endpoint {endpoint} is registered by {}", owner.id()),
                ));
            }
        }
        None
    }

    async fn on_join_requested(&self, sender: &str, request: ClientJoinRequested) -> Result<()> {
        let declared = match normalize_declarations(&request, self.hashing.as_ref()) {
            Ok(declared) => declared,
            Err(reason) => {
                return self
                    .deny(sender, ClientJoinDeniedCode::Other, Some(reason))
                    .await
            }
        };

        let mut session = self.core.write_when(TrackerCore::is_settled).await;
        if session.is_disposed() {
            return Ok(());
        }
        if let Some((code, reason)) = self.admission_check(&session.map, sender, &request) {
            drop(session);
            return self.deny(sender, code, Some(reason)).await;
        }

        let plan = plan_join(&session.map, &declared);
        let accepted = ClientJoinAccepted {
            event_id: Uuid::new_v4(),
            client_identifier: sender.to_string(),
            fragment_size: self.config.fragment_size,
            add_file_infos: plan.add_files.clone(),
            add_fragment_infos: plan.add_fragments.clone(),
            remove_file_infos: plan.remove_files.clone(),
            remove_fragment_infos: plan.remove_fragments.clone(),
            clients: session
                .map
                .peers()
                .filter(|peer| peer.id() != sender)
                .map(|peer| (peer.id().to_string(), peer.to_metadata()))
                .collect(),
        };

        let id = session.next_session_id();
        let timeout =
            self.schedule_timeout(move |tracker| async move { tracker.on_join_timeout(id).await });
        session.state = TrackerState::WaitForJoinResponse(Waiting {
            id,
            timeout,
            data: PendingJoin {
                client_id: sender.to_string(),
                endpoints: request.endpoints,
                plan,
            },
        });

        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::ClientJoinAccepted(accepted))
            .await
        {
            let mut session = shared.disable_reads().await;
            session.take_session(id);
            return Err(e);
        }
        info!(peer = %sender, session = id, "Join accepted, awaiting confirmation");
        Ok(())
    }

    async fn on_join_succeeded(&self, sender: &str) -> Result<()> {
        let mut session = self.core.write().await;
        let id = match &session.state {
            TrackerState::WaitForJoinResponse(join) if join.data.client_id == sender => join.id,
            _ => {
                debug!(peer = %sender, "Unexpected join confirmation ignored");
                return Ok(());
            }
        };
        let Some(TrackerState::WaitForJoinResponse(join)) = session.take_session(id) else {
            return Ok(());
        };
        join.timeout.cancel();
        let PendingJoin {
            client_id,
            endpoints,
            plan,
        } = join.data;

        let snapshot = session.map.clone();
        for (hash, meta) in &plan.learned_files {
            if let Ok(file) = FragmentedFileInfo::from_metadata(hash.clone(), meta) {
                session.map.try_add_file(file);
            }
        }
        for (hash, meta) in &plan.learned_fragments {
            session.map.try_add_fragment(hash.clone(), meta.size);
        }
        // A rejoining peer replaces its previous registration
        session.map.remove_peer(&client_id);
        session
            .map
            .try_add_peer(client_id.clone(), endpoints, plan.stored_fragments.clone());

        let registered = ClientRegistered {
            event_id: Uuid::new_v4(),
            client_identifier: client_id.clone(),
            info: session
                .map
                .try_get_peer(&client_id)
                .map(PeerInfo::to_metadata)
                .unwrap_or_default(),
            added_files: plan.learned_files,
            added_fragments: plan.learned_fragments,
        };

        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::ClientRegistered(registered))
            .await
        {
            let mut session = shared.disable_reads().await;
            session.map = snapshot;
            return Err(e);
        }
        info!(peer = %client_id, peers = shared.map.peer_count(), "Peer registered");
        Ok(())
    }

    async fn on_join_failed(&self, sender: &str) {
        let mut session = self.core.write().await;
        let id = match &session.state {
            TrackerState::WaitForJoinResponse(join) if join.data.client_id == sender => join.id,
            _ => return,
        };
        session.take_session(id);
        info!(peer = %sender, "Join abandoned by peer");
    }

    async fn on_join_timeout(&self, id: u64) {
        let mut session = self.core.write().await;
        let Some(TrackerState::WaitForJoinResponse(join)) = session.take_session(id) else {
            return;
        };
        join.timeout.disarm();
        drop(session);

        let client = join.data.client_id;
        warn!(peer = %client, session = id, "Join confirmation timed out");
        if let Err(e) = self
            .deny(&client, ClientJoinDeniedCode::Other, Some(JOIN_TIMEOUT_REASON.into()))
            .await
        {
            debug!(peer = %client, error = %e, "Timeout denial not delivered");
        }
    }

    async fn on_client_goodbye(&self, sender: &str) {
        let mut session = self.core.write_when(TrackerCore::is_settled).await;
        if session.map.remove_peer(sender) {
            info!(peer = %sender, peers = session.map.peer_count(), "Peer left");
        }
    }

    // =========================================================================
    // FILE PUBLICATION
    // =========================================================================

    async fn publish_file_info(
        &self,
        hash: &str,
        size: i64,
        fragment_sequence: &[String],
    ) -> Result<()> {
        if size <= 0 {
            return Err(TrackerError::InvalidFileSize(size));
        }
        let hash = self.normalize(hash)?;
        let sequence = fragment_sequence
            .iter()
            .map(|fragment| self.normalize(fragment))
            .collect::<Result<Vec<_>>>()?;
        let file = FragmentedFileInfo::new(hash.clone(), size, sequence.clone())
            .map_err(|_| TrackerError::InvalidFileSize(size))?;

        let mut session = self.core.write_when(TrackerCore::is_settled).await;
        if session.is_disposed() {
            return Err(TrackerError::Disposed);
        }
        if !session.map.try_add_file(file) {
            return Err(TrackerError::DuplicateFile(hash));
        }

        let fragments = sequence.len();
        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::FileInfoPublished(FileInfoPublished::new(
                hash.clone(),
                size,
                sequence,
            )))
            .await
        {
            let mut session = shared.disable_reads().await;
            session.map.remove_file(&hash);
            return Err(e);
        }
        info!(file = %hash, size, fragments, "File info published");
        Ok(())
    }

    // =========================================================================
    // FRAGMENT DISTRIBUTION
    // =========================================================================

    async fn distribute_fragment(&self, hash: &str, data: Vec<u8>) -> Result<Vec<String>> {
        if data.is_empty() {
            return Err(TrackerError::EmptyFragment);
        }
        let size = i64::try_from(data.len()).unwrap_or(i64::MAX);
        if size > self.config.fragment_size {
            return Err(TrackerError::FragmentTooLarge {
                size,
                max: self.config.fragment_size,
            });
        }
        let hash = self.normalize(hash)?;
        let digest = self.hashing.compute_digest(&data);
        if digest != hash {
            return Err(TrackerError::HashMismatch {
                expected: hash,
                actual: digest,
            });
        }

        let mut session = self.core.write_when(TrackerCore::is_settled).await;
        if session.is_disposed() {
            return Err(TrackerError::Disposed);
        }
        if session.map.contains_fragment(&hash) {
            return Err(TrackerError::DuplicateFragment(hash));
        }

        let (result, outcome) = oneshot::channel();
        let id = session.next_session_id();
        let timeout = self
            .schedule_timeout(move |tracker| async move { tracker.on_request_timeout(id).await });
        session.state = TrackerState::WaitForDistributionRequests(Waiting {
            id,
            timeout,
            data: PendingRequests {
                hash: hash.clone(),
                data,
                requestors: BTreeSet::new(),
                result,
            },
        });

        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::FragmentDistributionStarted(
                FragmentDistributionStarted::new(hash.clone(), size),
            ))
            .await
        {
            let mut session = shared.disable_reads().await;
            session.take_session(id);
            return Err(e);
        }
        drop(shared);
        info!(fragment = %hash, size, session = id, "Fragment distribution started");

        outcome.await.unwrap_or(Err(TrackerError::Aborted))
    }

    async fn on_distribution_requested(&self, sender: &str, hash: &str) {
        let Some(hash) = self.hashing.try_normalize(hash) else {
            return;
        };
        let mut session = self.core.write().await;
        let registered = session.map.contains_peer(sender);
        let id = match &mut session.state {
            TrackerState::WaitForDistributionRequests(requests) if requests.data.hash == hash => {
                if !registered {
                    debug!(
                        peer = %sender,
                        fragment = %hash,
                        "Request from unregistered peer ignored"
                    );
                    return;
                }
                requests.data.requestors.insert(sender.to_string());
                if requests.data.requestors.len() < self.config.desired_replicas {
                    return;
                }
                requests.id
            }
            _ => {
                debug!(
                    peer = %sender,
                    fragment = %hash,
                    "Request outside the volunteer window ignored"
                );
                return;
            }
        };
        let Some(TrackerState::WaitForDistributionRequests(requests)) = session.take_session(id)
        else {
            return;
        };
        requests.timeout.cancel();
        info!(
            fragment = %hash,
            volunteers = requests.data.requestors.len(),
            "Desired replica count reached"
        );
        self.begin_delivery(session, requests.data).await;
    }

    async fn on_request_timeout(&self, id: u64) {
        let mut session = self.core.write().await;
        let Some(TrackerState::WaitForDistributionRequests(requests)) = session.take_session(id)
        else {
            return;
        };
        requests.timeout.disarm();
        info!(
            fragment = %requests.data.hash,
            volunteers = requests.data.requestors.len(),
            "Volunteer window closed"
        );
        self.begin_delivery(session, requests.data).await;
    }

    /// Move from volunteer collection to delivery. `session` is `Idle`.
    async fn begin_delivery(
        &self,
        mut session: WriteSession<'_, TrackerCore>,
        requests: PendingRequests,
    ) {
        let PendingRequests {
            hash,
            data,
            requestors,
            result,
        } = requests;
        if requestors.is_empty() {
            drop(session);
            warn!(fragment = %hash, "No peer volunteered");
            let _ = result.send(Err(TrackerError::NoVolunteers(hash)));
            return;
        }

        let size = i64::try_from(data.len()).unwrap_or(i64::MAX);
        let receivers = requestors.len();
        let delivered = FragmentDistributionDelivered::new(
            hash.clone(),
            data,
            requestors.iter().cloned().collect(),
        );
        let id = session.next_session_id();
        let timeout = self
            .schedule_timeout(move |tracker| async move { tracker.on_delivery_timeout(id).await });
        session.state = TrackerState::WaitForDistributionDelivery(Waiting {
            id,
            timeout,
            data: PendingDelivery {
                hash: hash.clone(),
                size,
                open: requestors,
                confirmed: BTreeSet::new(),
                result,
            },
        });

        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::FragmentDistributionDelivered(delivered))
            .await
        {
            let mut session = shared.disable_reads().await;
            if let Some(TrackerState::WaitForDistributionDelivery(delivery)) =
                session.take_session(id)
            {
                drop(session);
                let _ = delivery.data.result.send(Err(e));
            }
            return;
        }
        info!(fragment = %hash, receivers, session = id, "Fragment delivered");
    }

    async fn on_distribution_outcome(&self, sender: &str, hash: &str, obtained: bool) {
        let Some(hash) = self.hashing.try_normalize(hash) else {
            return;
        };
        let mut session = self.core.write().await;
        let id = match &mut session.state {
            TrackerState::WaitForDistributionDelivery(delivery) if delivery.data.hash == hash => {
                if !delivery.data.open.remove(sender) {
                    debug!(
                        peer = %sender,
                        fragment = %hash,
                        "Outcome from unexpected peer ignored"
                    );
                    return;
                }
                if obtained {
                    delivery.data.confirmed.insert(sender.to_string());
                }
                debug!(
                    peer = %sender,
                    fragment = %hash,
                    obtained,
                    remaining = delivery.data.open.len(),
                    "Delivery outcome recorded"
                );
                if !delivery.data.open.is_empty() {
                    return;
                }
                delivery.id
            }
            _ => {
                debug!(
                    peer = %sender,
                    fragment = %hash,
                    "Outcome outside the delivery window ignored"
                );
                return;
            }
        };
        let Some(TrackerState::WaitForDistributionDelivery(delivery)) = session.take_session(id)
        else {
            return;
        };
        delivery.timeout.cancel();
        self.finalize_delivery(session, delivery.data).await;
    }

    async fn on_delivery_timeout(&self, id: u64) {
        let mut session = self.core.write().await;
        let Some(TrackerState::WaitForDistributionDelivery(delivery)) = session.take_session(id)
        else {
            return;
        };
        delivery.timeout.disarm();
        warn!(
            fragment = %delivery.data.hash,
            unanswered = delivery.data.open.len(),
            "Delivery window closed"
        );
        self.finalize_delivery(session, delivery.data).await;
    }

    /// Register confirmed owners and announce the end. `session` is `Idle`.
    async fn finalize_delivery(
        &self,
        mut session: WriteSession<'_, TrackerCore>,
        delivery: PendingDelivery,
    ) {
        let PendingDelivery {
            hash,
            size,
            open,
            confirmed,
            result,
        } = delivery;
        if confirmed.is_empty() {
            drop(session);
            warn!(fragment = %hash, "No peer confirmed the fragment");
            let _ = result.send(Err(TrackerError::NoConfirmations(hash)));
            return;
        }

        let snapshot = session.map.clone();
        session.map.try_add_fragment(hash.clone(), size);
        session
            .map
            .try_add_fragment_to_peers(&hash, confirmed.iter().map(String::as_str));
        let uris = session.map.fragment_uris(&hash).unwrap_or_default();
        let ended =
            FragmentDistributionEnded::new(hash.clone(), size, confirmed.iter().cloned().collect());

        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::FragmentDistributionEnded(ended))
            .await
        {
            let mut session = shared.disable_reads().await;
            session.map = snapshot;
            drop(session);
            let _ = result.send(Err(e));
            return;
        }
        drop(shared);
        info!(
            fragment = %hash,
            replicas = confirmed.len(),
            unanswered = open.len(),
            "Fragment distribution ended"
        );
        let _ = result.send(Ok(uris));
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    async fn shutdown(&self) -> Result<()> {
        let mut session = self.core.write().await;
        let previous = mem::replace(&mut session.state, TrackerState::Disposed);
        if matches!(previous, TrackerState::Disposed) {
            return Ok(());
        }
        session.map.clear();
        drop(session);

        match previous {
            TrackerState::WaitForDistributionRequests(requests) => {
                let _ = requests.data.result.send(Err(TrackerError::Aborted));
            }
            TrackerState::WaitForDistributionDelivery(delivery) => {
                let _ = delivery.data.result.send(Err(TrackerError::Aborted));
            }
            TrackerState::WaitForJoinResponse(join) => {
                debug!(peer = %join.data.client_id, "Pending join abandoned");
            }
            TrackerState::Idle | TrackerState::Disposed => {}
        }

        self.publish(DistributionEvent::TrackerGoodbye(TrackerGoodbye::new()))
            .await?;
        info!(node = %self.transport.client_id(), "Tracker shut down");
        Ok(())
    }
}
