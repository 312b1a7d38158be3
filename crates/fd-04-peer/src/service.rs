//! # Peer Service
//!
//! A peer joins the network through the tracker, keeps a replica of the
//! distribution map and volunteers to store announced fragments.
//!
//! ## Phases
//!
//! ```text
//!                initialize             JoinAccepted              own ClientRegistered
//!   Initializing ─────────> WaitForJoinResponse ─────────> WaitForRegistration ─────────> Idle
//!        ^                          │                              │                     │  ^
//!        │      denied / timeout    │       timeout / bad commit   │        Started      │  │ Delivered /
//!        └──────────────────────────┴──────────────────────────────┘                     v  │ Ended / timeout
//!                                                                           WaitForFragmentDelivery
//! ```
//!
//! `TrackerHello` and `TrackerGoodbye` reset any phase to `Initializing`,
//! reverting the catalog to its last commit. A hello also rejoins with the
//! endpoints of the last `initialize` call.
//!
//! Steady-state updates (other peers' registrations and goodbyes, file
//! announcements, distribution results) merge into the map whatever the
//! phase. Files learned while registered are committed to the catalog.
//!
//! A delivery wait that times out returns the peer to `Idle`, but the
//! delivery it volunteered for is still accepted until that distribution
//! ends.

use crate::config::PeerConfig;
use crate::domain::{
    AcceptAll, AdmissionPolicy, ExpectedFragment, PeerCore, PeerPhase, PeerState, Waiting,
};
use crate::error::{PeerError, Result, StorageError};
use crate::ports::{FragmentStorage, PersistentCatalog};
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
    ClientGoodbye, ClientJoinAccepted, ClientJoinDenied, ClientJoinFailed, ClientJoinRequested,
    ClientJoinSucceeded, ClientRegistered, ContentHash, FileInfoPublished,
    FragmentDistributionDelivered, FragmentDistributionEnded, FragmentDistributionFailed,
    FragmentDistributionObtained, FragmentDistributionRequested, FragmentDistributionStarted,
    FragmentMetadata, HashService,
};
use std::collections::HashMap;
use std::future::Future;
use std::io::Read;
use std::mem;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Peer node. Cheap to clone; clones share one state machine.
#[derive(Clone)]
pub struct PeerService {
    inner: Arc<PeerInner>,
    // Keeps the transport callback alive
    _dispatcher: Arc<EventDispatcher<PeerInner>>,
}

struct PeerInner {
    config: PeerConfig,
    hashing: Arc<dyn HashService>,
    transport: Arc<dyn TransportEndpoint>,
    storage: Arc<dyn FragmentStorage>,
    policy: Arc<dyn AdmissionPolicy>,
    core: CoordinatorLock<PeerCore>,
    self_ref: Weak<PeerInner>,
}

impl PeerService {
    /// Create a peer that volunteers for every fragment it can hold.
    ///
    /// # Errors
    ///
    /// Returns `PeerError::Config` if `config` is out of range, or a
    /// transport error if the inbound callback cannot be registered.
    pub fn new(
        config: PeerConfig,
        transport: Arc<dyn TransportEndpoint>,
        hashing: Arc<dyn HashService>,
        storage: Arc<dyn FragmentStorage>,
        catalog: Box<dyn PersistentCatalog>,
    ) -> Result<Self> {
        Self::with_policy(config, transport, hashing, storage, catalog, Arc::new(AcceptAll))
    }

    /// Create a peer with a custom volunteer admission policy.
    ///
    /// # Errors
    ///
    /// Same as [`PeerService::new`].
    pub fn with_policy(
        config: PeerConfig,
        transport: Arc<dyn TransportEndpoint>,
        hashing: Arc<dyn HashService>,
        storage: Arc<dyn FragmentStorage>,
        catalog: Box<dyn PersistentCatalog>,
        policy: Arc<dyn AdmissionPolicy>,
    ) -> Result<Self> {
        Self::with_seen_cache(
            config,
            transport,
            hashing,
            storage,
            catalog,
            policy,
            SeenEventCache::new(),
        )
    }

    /// Create a peer with a custom policy and duplicate-suppression cache.
    ///
    /// # Errors
    ///
    /// Same as [`PeerService::new`].
    pub fn with_seen_cache(
        config: PeerConfig,
        transport: Arc<dyn TransportEndpoint>,
        hashing: Arc<dyn HashService>,
        storage: Arc<dyn FragmentStorage>,
        catalog: Box<dyn PersistentCatalog>,
        policy: Arc<dyn AdmissionPolicy>,
        seen: SeenEventCache,
    ) -> Result<Self> {
        config.validate()?;
        let node_id = transport.client_id().to_string();

        let inner = Arc::new_cyclic(|self_ref| PeerInner {
            config,
            hashing,
            transport,
            storage,
            policy,
            core: CoordinatorLock::new(PeerCore::new(catalog)),
            self_ref: self_ref.clone(),
        });
        let dispatcher = Arc::new(EventDispatcher::new(
            node_id.clone(),
            Arc::clone(&inner),
            seen,
        ));
        dispatcher.attach(inner.transport.as_ref())?;

        info!(node = %node_id, timeout_ms = inner.config.timeout_ms, "Peer created");
        Ok(Self {
            inner,
            _dispatcher: dispatcher,
        })
    }

    /// Join the network, serving fragments at `endpoints`.
    ///
    /// Rebuilds the map from the committed catalog and stored fragments,
    /// then resolves once the tracker has registered this peer.
    ///
    /// # Errors
    ///
    /// - `Denied` if the tracker refused the join
    /// - `InvalidAccept` if the tracker's diff could not be applied
    /// - `Timeout` if the tracker did not answer in time
    /// - `Catalog` if the joined state could not be committed
    /// - `Reset` if the tracker left mid-join
    /// - `Publish` if a handshake message could not be sent
    /// - `Disposed` after shutdown
    pub async fn initialize(&self, endpoints: Vec<String>) -> Result<()> {
        self.inner.initialize(endpoints).await
    }

    /// Leave the network and dispose. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a publish error if `ClientGoodbye` cannot be sent. The peer
    /// is disposed either way.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }

    /// Read a stored fragment.
    ///
    /// # Errors
    ///
    /// Returns `Storage(NotFound)` for an unknown or malformed hash.
    pub fn read_fragment(&self, hash: &str) -> Result<Vec<u8>> {
        let hash = self
            .inner
            .hashing
            .try_normalize(hash)
            .unwrap_or_else(|| hash.to_string());
        let mut reader = self.inner.storage.read_fragment(&hash)?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(StorageError::from)?;
        Ok(data)
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.inner.transport.client_id()
    }

    #[must_use]
    pub fn config(&self) -> &PeerConfig {
        &self.inner.config
    }

    pub async fn phase(&self) -> PeerPhase {
        self.inner.core.read().await.state.phase()
    }

    /// Known peers, this one included, ordered by id.
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
impl DistributionObserver for PeerService {
    async fn fragment_size(&self) -> Option<i64> {
        self.inner.core.read().await.fragment_size
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
impl EventHandler for PeerInner {
    type Error = PeerError;

    async fn handle(&self, sender_id: &str, event: DistributionEvent) -> Result<()> {
        let own_id = self.transport.client_id();
        if sender_id == own_id {
            return Ok(());
        }
        match event {
            DistributionEvent::TrackerHello(_) => {
                self.on_tracker_hello(sender_id).await;
                Ok(())
            }
            DistributionEvent::TrackerGoodbye(_) => {
                self.on_tracker_goodbye(sender_id).await;
                Ok(())
            }
            DistributionEvent::ClientJoinAccepted(accepted)
                if accepted.client_identifier == own_id =>
            {
                self.on_join_accepted(accepted).await
            }
            DistributionEvent::ClientJoinDenied(denied) if denied.client_identifier == own_id => {
                self.on_join_denied(denied).await;
                Ok(())
            }
            DistributionEvent::ClientRegistered(registered)
                if registered.client_identifier == own_id =>
            {
                self.on_registered(sender_id).await
            }
            DistributionEvent::ClientRegistered(registered) => {
                self.on_peer_registered(registered).await;
                Ok(())
            }
            DistributionEvent::ClientGoodbye(_) => {
                self.on_peer_goodbye(sender_id).await;
                Ok(())
            }
            DistributionEvent::FileInfoPublished(published) => {
                self.on_file_info_published(published).await;
                Ok(())
            }
            DistributionEvent::FragmentDistributionStarted(started) => {
                self.on_distribution_started(started).await
            }
            DistributionEvent::FragmentDistributionDelivered(delivered)
                if delivered.receivers.iter().any(|r| r == own_id) =>
            {
                self.on_fragment_delivered(delivered).await
            }
            DistributionEvent::FragmentDistributionEnded(ended) => {
                self.on_distribution_ended(ended).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl PeerInner {
    fn client_id(&self) -> &str {
        self.transport.client_id()
    }

    async fn publish(&self, event: DistributionEvent) -> Result<()> {
        publish_event(self.transport.as_ref(), &event).await?;
        Ok(())
    }

    /// Run `action` after the configured timeout unless the handle is dropped.
    fn schedule_timeout<F, Fut>(&self, action: F) -> TimeoutHandle
    where
        F: FnOnce(Arc<PeerInner>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let peer = self.self_ref.clone();
        TimeoutHandle::schedule(self.config.timeout(), async move {
            if let Some(peer) = peer.upgrade() {
                action(peer).await;
            }
        })
    }

    /// Return to `Initializing` with the map rebuilt from committed state.
    ///
    /// Any waiting phase is cancelled; the pending `initialize` call, if
    /// any, is left for the caller to resolve.
    fn reset(&self, core: &mut PeerCore) {
        mem::replace(&mut core.state, PeerState::Initializing).cancel_timeout();
        core.lapsed = None;
        core.catalog.revert();
        core.map.clear();

        let contents = core.catalog.contents().clone();
        for (hash, meta) in &contents.file_infos {
            match FragmentedFileInfo::from_metadata(hash.clone(), meta) {
                Ok(file) => {
                    core.map.try_add_file(file);
                }
                Err(e) => warn!(file = %hash, error = %e, "Skipping invalid catalog entry"),
            }
        }
        let stored = self.storage.fragments();
        for hash in &stored {
            if let Some(size) = self.storage.fragment_size(hash) {
                core.map.try_add_fragment(hash.clone(), size);
            }
        }
        core.fragment_size = contents.fragment_size;
        if let Some(endpoints) = core.endpoints.clone() {
            core.map.try_add_peer(self.client_id(), endpoints, stored);
        }
        debug!(
            node = %self.client_id(),
            files = core.map.file_count(),
            fragments = core.map.fragment_count(),
            "Peer state rebuilt from catalog"
        );
    }

    // =========================================================================
    // JOIN HANDSHAKE
    // =========================================================================

    async fn initialize(&self, endpoints: Vec<String>) -> Result<()> {
        let mut session = self.core.write_when(PeerCore::is_settled).await;
        if session.is_disposed() {
            return Err(PeerError::Disposed);
        }
        session.endpoints = Some(endpoints);
        self.reset(&mut session);

        let (waiter, outcome) = oneshot::channel();
        session.await_join(waiter);
        self.begin_join(session).await;

        outcome.await.unwrap_or(Err(PeerError::Aborted))
    }

    /// Publish a join request and wait for the answer. `session` is
    /// `Initializing` with a rebuilt map.
    async fn begin_join(&self, mut session: WriteSession<'_, PeerCore>) {
        let Some(endpoints) = session.endpoints.clone() else {
            return;
        };
        let contents = session.catalog.contents();
        let algorithm = contents
            .hash_algorithm
            .clone()
            .unwrap_or_else(|| self.hashing.algorithm_name().to_string());
        let fragment_size = contents.fragment_size;
        let known_files: HashMap<ContentHash, _> = contents
            .file_infos
            .iter()
            .map(|(hash, meta)| (hash.clone(), meta.clone()))
            .collect();
        let stored: HashMap<ContentHash, FragmentMetadata> = self
            .storage
            .fragments()
            .into_iter()
            .filter_map(|hash| {
                let size = self.storage.fragment_size(&hash)?;
                Some((hash, FragmentMetadata::new(size)))
            })
            .collect();
        let (files, fragments) = (known_files.len(), stored.len());
        let request = ClientJoinRequested::new(
            algorithm,
            fragment_size,
            known_files,
            stored,
            endpoints.clone(),
        );

        let id = session.next_session_id();
        let timeout =
            self.schedule_timeout(move |peer| async move { peer.on_join_timeout(id).await });
        session.state = PeerState::WaitForJoinResponse(Waiting {
            id,
            timeout,
            data: (),
        });

        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::ClientJoinRequested(request))
            .await
        {
            error!(node = %self.client_id(), error = %e, "Join request not sent");
            let mut session = shared.disable_reads().await;
            if let Some(state) = session.take_session(id, PeerState::Initializing) {
                state.cancel_timeout();
                session.resolve_join(Err(e));
            }
            return;
        }
        info!(
            node = %self.client_id(),
            endpoints = endpoints.len(),
            files,
            fragments,
            session = id,
            "Join requested"
        );
    }

    async fn on_join_accepted(&self, accepted: ClientJoinAccepted) -> Result<()> {
        let mut session = self.core.write().await;
        let id = match &session.state {
            PeerState::WaitForJoinResponse(join) => join.id,
            _ => {
                debug!(node = %self.client_id(), "Unexpected join acceptance ignored");
                return Ok(());
            }
        };
        if let Some(state) = session.take_session(id, PeerState::Initializing) {
            state.cancel_timeout();
        }

        let stale = match self.apply_accepted(&mut session, &accepted) {
            Ok(stale) => stale,
            Err(reason) => {
                warn!(node = %self.client_id(), reason = %reason, "Join diff rejected");
                self.reset(&mut session);
                session.resolve_join(Err(PeerError::InvalidAccept(reason)));
                drop(session);
                return self
                    .publish(DistributionEvent::ClientJoinFailed(ClientJoinFailed::new()))
                    .await;
            }
        };

        let dropped = stale.len();
        let id = session.next_session_id();
        let timeout = self
            .schedule_timeout(move |peer| async move { peer.on_registration_timeout(id).await });
        session.state = PeerState::WaitForRegistration(Waiting {
            id,
            timeout,
            data: stale,
        });

        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::ClientJoinSucceeded(ClientJoinSucceeded::new()))
            .await
        {
            error!(node = %self.client_id(), error = %e, "Join confirmation not sent");
            let mut session = shared.disable_reads().await;
            if session.take_session(id, PeerState::Initializing).is_some() {
                self.reset(&mut session);
                session.resolve_join(Err(e));
            }
            return Ok(());
        }
        info!(
            node = %self.client_id(),
            files = shared.map.file_count(),
            fragments = shared.map.fragment_count(),
            peers = shared.map.peer_count(),
            dropped,
            "Join diff applied, awaiting registration"
        );
        Ok(())
    }

    /// Apply the tracker's diff to the map and the uncommitted catalog:
    /// removals, then additions, then the roster.
    ///
    /// Returns the stored fragments to delete once registered. The whole
    /// diff is validated before anything changes.
    fn apply_accepted(
        &self,
        core: &mut PeerCore,
        accepted: &ClientJoinAccepted,
    ) -> std::result::Result<Vec<ContentHash>, String> {
        if accepted.fragment_size <= 0 {
            return Err(format!("Invalid fragment size {}", accepted.fragment_size));
        }
        let normalize = |hash: &str| {
            self.hashing
                .try_normalize(hash)
                .ok_or_else(|| format!("Invalid hash '{hash}'"))
        };

        let remove_files = accepted
            .remove_file_infos
            .iter()
            .map(|hash| normalize(hash))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let remove_fragments = accepted
            .remove_fragment_infos
            .iter()
            .map(|hash| normalize(hash))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut add_files = Vec::with_capacity(accepted.add_file_infos.len());
        for (hash, meta) in &accepted.add_file_infos {
            let sequence = meta
                .fragment_sequence
                .iter()
                .map(|fragment| normalize(fragment))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let file = FragmentedFileInfo::new(normalize(hash)?, meta.size, sequence)
                .map_err(|e| e.to_string())?;
            add_files.push(file);
        }
        let mut add_fragments = Vec::with_capacity(accepted.add_fragment_infos.len());
        for (hash, meta) in &accepted.add_fragment_infos {
            if meta.size <= 0 {
                return Err(format!("Fragment {hash} has invalid size {}", meta.size));
            }
            add_fragments.push((normalize(hash)?, meta.size));
        }
        let mut roster = Vec::with_capacity(accepted.clients.len());
        for (id, client) in &accepted.clients {
            if id == self.client_id() {
                continue;
            }
            let stored = client
                .stored_fragments
                .iter()
                .map(|fragment| normalize(fragment))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            roster.push((id.clone(), client.endpoints.clone(), stored));
        }

        let catalog = core.catalog.contents_mut();
        for hash in &remove_files {
            core.map.remove_file(hash);
            catalog.file_infos.remove(hash);
        }
        let mut stale = Vec::new();
        for hash in remove_fragments {
            core.map.remove_fragment(&hash);
            if self.storage.fragment_size(&hash).is_some() {
                stale.push(hash);
            }
        }
        for file in add_files {
            catalog
                .file_infos
                .insert(file.hash().to_string(), file.to_metadata());
            core.map.remove_file(file.hash());
            core.map.try_add_file(file);
        }
        for (hash, size) in add_fragments {
            core.map.remove_fragment(&hash);
            core.map.try_add_fragment(hash, size);
        }
        for (id, endpoints, stored) in roster {
            core.map.remove_peer(&id);
            core.map.try_add_peer(id, endpoints, stored);
        }

        catalog.fragment_size = Some(accepted.fragment_size);
        catalog.hash_algorithm = Some(self.hashing.algorithm_name().to_string());
        core.fragment_size = Some(accepted.fragment_size);
        Ok(stale)
    }

    async fn on_registered(&self, sender: &str) -> Result<()> {
        let mut session = self.core.write().await;
        let id = match &session.state {
            PeerState::WaitForRegistration(registration) => registration.id,
            _ => {
                debug!(node = %self.client_id(), "Unexpected registration ignored");
                return Ok(());
            }
        };
        let Some(PeerState::WaitForRegistration(registration)) =
            session.take_session(id, PeerState::Idle)
        else {
            return Ok(());
        };
        registration.timeout.cancel();

        if let Err(e) = session.catalog.commit() {
            error!(
                node = %self.client_id(),
                error = %e,
                "Catalog commit failed, leaving the network"
            );
            self.reset(&mut session);
            session.resolve_join(Err(e.into()));
            drop(session);
            return self
                .publish(DistributionEvent::ClientGoodbye(ClientGoodbye::new()))
                .await;
        }
        for hash in &registration.data {
            if let Err(e) = self.storage.delete_fragment(hash, true) {
                warn!(fragment = %hash, error = %e, "Stale fragment not deleted");
            }
        }
        info!(
            node = %self.client_id(),
            tracker = %sender,
            files = session.map.file_count(),
            deleted = registration.data.len(),
            "Peer registered"
        );
        session.resolve_join(Ok(()));
        Ok(())
    }

    async fn on_join_denied(&self, denied: ClientJoinDenied) {
        let mut session = self.core.write().await;
        // The tracker may deny after our confirmation when its own wait expired
        if !matches!(
            session.state,
            PeerState::WaitForJoinResponse(_) | PeerState::WaitForRegistration(_)
        ) {
            debug!(node = %self.client_id(), "Unexpected denial ignored");
            return;
        }
        warn!(
            node = %self.client_id(),
            code = %denied.reason_code,
            reason = denied.reason.as_deref().unwrap_or_default(),
            "Join denied"
        );
        self.reset(&mut session);
        session.resolve_join(Err(PeerError::Denied {
            code: denied.reason_code,
            reason: denied.reason,
        }));
    }

    async fn on_join_timeout(&self, id: u64) {
        let mut session = self.core.write().await;
        let Some(PeerState::WaitForJoinResponse(join)) =
            session.take_session(id, PeerState::Initializing)
        else {
            return;
        };
        join.timeout.disarm();
        warn!(node = %self.client_id(), session = id, "Join request timed out");
        self.reset(&mut session);
        session.resolve_join(Err(PeerError::Timeout));
    }

    async fn on_registration_timeout(&self, id: u64) {
        let mut session = self.core.write().await;
        let Some(PeerState::WaitForRegistration(registration)) =
            session.take_session(id, PeerState::Initializing)
        else {
            return;
        };
        registration.timeout.disarm();
        warn!(node = %self.client_id(), session = id, "Registration timed out");
        self.reset(&mut session);
        session.resolve_join(Err(PeerError::Timeout));
        drop(session);

        // The tracker may have registered us already
        if let Err(e) = self
            .publish(DistributionEvent::ClientGoodbye(ClientGoodbye::new()))
            .await
        {
            debug!(node = %self.client_id(), error = %e, "Goodbye after timeout not delivered");
        }
    }

    async fn on_tracker_hello(&self, sender: &str) {
        let mut session = self.core.write().await;
        if session.is_disposed() || session.endpoints.is_none() {
            return;
        }
        info!(node = %self.client_id(), tracker = %sender, "Tracker announced, rejoining");
        self.reset(&mut session);
        self.begin_join(session).await;
    }

    async fn on_tracker_goodbye(&self, sender: &str) {
        let mut session = self.core.write().await;
        if session.is_disposed() {
            return;
        }
        info!(node = %self.client_id(), tracker = %sender, "Tracker left, resetting");
        self.reset(&mut session);
        session.resolve_join(Err(PeerError::Reset));
    }

    // =========================================================================
    // STEADY-STATE REPLICATION
    // =========================================================================

    /// Record `files` in the catalog; commit when registered.
    fn record_files(&self, core: &mut PeerCore, files: &[FragmentedFileInfo]) {
        if files.is_empty() {
            return;
        }
        let registered = core.is_registered();
        let fragment_size = core.fragment_size;
        let contents = core.catalog.contents_mut();
        for file in files {
            contents
                .file_infos
                .insert(file.hash().to_string(), file.to_metadata());
        }
        if !registered {
            return;
        }
        contents
            .hash_algorithm
            .get_or_insert_with(|| self.hashing.algorithm_name().to_string());
        contents.fragment_size = fragment_size;
        if let Err(e) = core.catalog.commit() {
            error!(node = %self.client_id(), error = %e, "Catalog commit failed");
        }
    }

    async fn on_peer_registered(&self, registered: ClientRegistered) {
        let files: Vec<FragmentedFileInfo> = registered
            .added_files
            .iter()
            .filter_map(|(hash, meta)| {
                let hash = self.hashing.try_normalize(hash)?;
                let sequence = meta
                    .fragment_sequence
                    .iter()
                    .map(|fragment| self.hashing.try_normalize(fragment))
                    .collect::<Option<Vec<_>>>()?;
                FragmentedFileInfo::new(hash, meta.size, sequence).ok()
            })
            .collect();
        let fragments: Vec<(ContentHash, i64)> = registered
            .added_fragments
            .iter()
            .filter_map(|(hash, meta)| Some((self.hashing.try_normalize(hash)?, meta.size)))
            .collect();
        let stored: Vec<ContentHash> = registered
            .info
            .stored_fragments
            .iter()
            .filter_map(|hash| self.hashing.try_normalize(hash))
            .collect();

        let mut session = self.core.write().await;
        if session.is_disposed() {
            return;
        }
        let added: Vec<FragmentedFileInfo> = files
            .into_iter()
            .filter(|file| session.map.try_add_file(file.clone()))
            .collect();
        for (hash, size) in fragments {
            session.map.try_add_fragment(hash, size);
        }
        let peer = registered.client_identifier;
        session.map.remove_peer(&peer);
        session
            .map
            .try_add_peer(peer.clone(), registered.info.endpoints, stored);
        self.record_files(&mut session, &added);
        info!(
            node = %self.client_id(),
            peer = %peer,
            files = added.len(),
            peers = session.map.peer_count(),
            "Peer joined the network"
        );
    }

    async fn on_peer_goodbye(&self, sender: &str) {
        let mut session = self.core.write().await;
        if session.is_disposed() {
            return;
        }
        if session.map.remove_peer(sender) {
            info!(
                node = %self.client_id(),
                peer = %sender,
                peers = session.map.peer_count(),
                "Peer left"
            );
        }
    }

    async fn on_file_info_published(&self, published: FileInfoPublished) {
        let file = self.hashing.try_normalize(&published.hash).and_then(|hash| {
            let sequence = published
                .fragment_sequence
                .iter()
                .map(|fragment| self.hashing.try_normalize(fragment))
                .collect::<Option<Vec<_>>>()?;
            FragmentedFileInfo::new(hash, published.size, sequence).ok()
        });
        let Some(file) = file else {
            warn!(
                node = %self.client_id(),
                file = %published.hash,
                "Invalid file announcement ignored"
            );
            return;
        };

        let mut session = self.core.write().await;
        if session.is_disposed() {
            return;
        }
        if let Some(known) = session.map.try_get_file(file.hash()) {
            if known != &file {
                warn!(
                    node = %self.client_id(),
                    file = %file.hash(),
                    "Conflicting file announcement ignored"
                );
            }
            return;
        }
        session.map.try_add_file(file.clone());
        self.record_files(&mut session, std::slice::from_ref(&file));
        info!(node = %self.client_id(), file = %file.hash(), size = file.size(), "File learned");
    }

    async fn on_distribution_ended(&self, ended: FragmentDistributionEnded) {
        let Some(hash) = self.hashing.try_normalize(&ended.hash) else {
            return;
        };
        let mut session = self.core.write().await;
        if session.is_disposed() {
            return;
        }
        session.lapsed = None;
        session.map.try_add_fragment(hash.clone(), ended.size);
        session
            .map
            .try_add_fragment_to_peers(&hash, ended.receivers.iter().map(String::as_str));

        let waiting = match &session.state {
            PeerState::WaitForFragmentDelivery(wait) => Some(wait.id),
            _ => None,
        };
        if let Some(id) = waiting {
            if let Some(state) = session.take_session(id, PeerState::Idle) {
                state.cancel_timeout();
                debug!(
                    node = %self.client_id(),
                    fragment = %hash,
                    "Distribution ended, delivery wait dropped"
                );
            }
        }
        debug!(
            node = %self.client_id(),
            fragment = %hash,
            replicas = ended.receivers.len(),
            "Fragment distribution recorded"
        );
    }

    // =========================================================================
    // FAN-OUT PARTICIPATION
    // =========================================================================

    /// Why this peer will not volunteer for a fragment, if it won't.
    fn decline_reason(&self, core: &PeerCore, hash: &str, size: i64) -> Option<&'static str> {
        if self.storage.fragment_size(hash).is_some() {
            return Some("already stored");
        }
        if size <= 0 {
            return Some("invalid size");
        }
        if core.fragment_size.is_some_and(|max| size > max) {
            return Some("larger than the fragment size");
        }
        if !self.policy.admit(hash, size) {
            return Some("refused by admission policy");
        }
        None
    }

    async fn on_distribution_started(&self, started: FragmentDistributionStarted) -> Result<()> {
        let Some(hash) = self.hashing.try_normalize(&started.hash) else {
            warn!(
                node = %self.client_id(),
                fragment = %started.hash,
                "Invalid fragment announcement ignored"
            );
            return Ok(());
        };
        let mut session = self.core.write().await;
        session.lapsed = None;
        let superseded = match &session.state {
            PeerState::Idle => None,
            PeerState::WaitForFragmentDelivery(wait) if wait.data.hash != hash => Some(wait.id),
            _ => {
                debug!(node = %self.client_id(), fragment = %hash, "Not volunteering outside idle");
                return Ok(());
            }
        };
        // A new announcement ends the previous distribution
        if let Some(state) = superseded.and_then(|id| session.take_session(id, PeerState::Idle)) {
            state.cancel_timeout();
        }
        if let Some(reason) = self.decline_reason(&session, &hash, started.size) {
            debug!(node = %self.client_id(), fragment = %hash, reason, "Declined to volunteer");
            return Ok(());
        }

        let id = session.next_session_id();
        let timeout = self
            .schedule_timeout(move |peer| async move { peer.on_delivery_timeout(id).await });
        session.state = PeerState::WaitForFragmentDelivery(Waiting {
            id,
            timeout,
            data: ExpectedFragment {
                hash: hash.clone(),
                size: started.size,
            },
        });

        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::FragmentDistributionRequested(
                FragmentDistributionRequested::new(hash.clone()),
            ))
            .await
        {
            let mut session = shared.disable_reads().await;
            if let Some(state) = session.take_session(id, PeerState::Idle) {
                state.cancel_timeout();
            }
            return Err(e);
        }
        info!(
            node = %self.client_id(),
            fragment = %hash,
            size = started.size,
            "Volunteered for fragment"
        );
        Ok(())
    }

    /// Check a delivered payload against the announcement and store it.
    fn accept_payload(
        &self,
        expected: &ExpectedFragment,
        data: &[u8],
    ) -> std::result::Result<(), String> {
        if i64::try_from(data.len()).ok() != Some(expected.size) {
            return Err(format!("size {} differs from announced {}", data.len(), expected.size));
        }
        let digest = self.hashing.compute_digest(data);
        if digest != expected.hash {
            return Err(format!("digest {digest} does not match"));
        }
        self.storage
            .store_fragment(&expected.hash, data)
            .map_err(|e| e.to_string())
    }

    async fn on_fragment_delivered(&self, delivered: FragmentDistributionDelivered) -> Result<()> {
        let hash = self
            .hashing
            .try_normalize(&delivered.hash)
            .unwrap_or_else(|| delivered.hash.clone());
        if !delivered.receivers.iter().any(|id| id == self.client_id()) {
            debug!(node = %self.client_id(), fragment = %hash, "Delivery for other peers ignored");
            return Ok(());
        }
        let mut session = self.core.write().await;
        let waiting = match &session.state {
            PeerState::WaitForFragmentDelivery(wait) if wait.data.hash == hash => Some(wait.id),
            _ => None,
        };
        let expected = match waiting.and_then(|id| session.take_session(id, PeerState::Idle)) {
            Some(PeerState::WaitForFragmentDelivery(wait)) => {
                wait.timeout.cancel();
                Some(wait.data)
            }
            // The tracker's volunteer window may outlast our own wait
            _ => session.take_lapsed(&hash),
        };
        let Some(expected) = expected else {
            if session.is_disposed() {
                return Ok(());
            }
            drop(session);
            debug!(node = %self.client_id(), fragment = %hash, "Unexpected delivery rejected");
            return self
                .publish(DistributionEvent::FragmentDistributionFailed(
                    FragmentDistributionFailed::new(hash),
                ))
                .await;
        };

        if let Err(reason) = self.accept_payload(&expected, &delivered.data) {
            drop(session);
            warn!(
                node = %self.client_id(),
                fragment = %hash,
                reason = %reason,
                "Delivered fragment rejected"
            );
            return self
                .publish(DistributionEvent::FragmentDistributionFailed(
                    FragmentDistributionFailed::new(hash),
                ))
                .await;
        }

        let snapshot = session.map.clone();
        session.map.try_add_fragment(hash.clone(), expected.size);
        session.map.try_add_fragment_to_peer(&hash, self.client_id());

        let shared = session.enable_reads();
        if let Err(e) = self
            .publish(DistributionEvent::FragmentDistributionObtained(
                FragmentDistributionObtained::new(hash.clone()),
            ))
            .await
        {
            let mut session = shared.disable_reads().await;
            session.map = snapshot;
            if let Err(e) = self.storage.delete_fragment(&hash, false) {
                warn!(fragment = %hash, error = %e, "Unconfirmed fragment not deleted");
            }
            return Err(e);
        }
        info!(node = %self.client_id(), fragment = %hash, size = expected.size, "Fragment stored");
        Ok(())
    }

    async fn on_delivery_timeout(&self, id: u64) {
        let mut session = self.core.write().await;
        let Some(PeerState::WaitForFragmentDelivery(wait)) =
            session.take_session(id, PeerState::Idle)
        else {
            return;
        };
        wait.timeout.disarm();
        info!(
            node = %self.client_id(),
            fragment = %wait.data.hash,
            "No delivery received yet, idling until the distribution ends"
        );
        session.lapsed = Some(wait.data);
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    async fn shutdown(&self) -> Result<()> {
        let mut session = self.core.write().await;
        let previous = mem::replace(&mut session.state, PeerState::Disposed);
        if matches!(previous, PeerState::Disposed) {
            return Ok(());
        }
        previous.cancel_timeout();
        session.lapsed = None;
        session.catalog.revert();
        session.map.clear();
        session.resolve_join(Err(PeerError::Disposed));
        let announced = session.endpoints.is_some();
        drop(session);

        if announced {
            self.publish(DistributionEvent::ClientGoodbye(ClientGoodbye::new()))
                .await?;
        }
        info!(node = %self.client_id(), "Peer shut down");
        Ok(())
    }
}
