//! Peer phases and the core the coordinator lock protects.

use crate::error::PeerError;
use crate::ports::PersistentCatalog;
use fd_01_distribution_map::DistributionMap;
use fd_02_coordinator_lock::TimeoutHandle;
use shared_types::ContentHash;
use std::fmt;
use std::mem;
use tokio::sync::oneshot;

/// Completion channel of an `initialize` call.
pub type JoinResult = oneshot::Sender<Result<(), PeerError>>;

/// A waiting phase: a unique session id, its timer, and phase data.
#[derive(Debug)]
pub struct Waiting<T> {
    pub id: u64,
    pub timeout: TimeoutHandle,
    pub data: T,
}

/// A fragment this peer volunteered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFragment {
    pub hash: ContentHash,
    pub size: i64,
}

#[derive(Debug, Default)]
pub enum PeerState {
    #[default]
    Initializing,
    WaitForJoinResponse(Waiting<()>),
    /// Carries the stored fragments to drop once registration is confirmed.
    WaitForRegistration(Waiting<Vec<ContentHash>>),
    Idle,
    WaitForFragmentDelivery(Waiting<ExpectedFragment>),
    Disposed,
}

impl PeerState {
    #[must_use]
    pub fn phase(&self) -> PeerPhase {
        match self {
            Self::Initializing => PeerPhase::Initializing,
            Self::WaitForJoinResponse(_) => PeerPhase::WaitForJoinResponse,
            Self::WaitForRegistration(_) => PeerPhase::WaitForRegistration,
            Self::Idle => PeerPhase::Idle,
            Self::WaitForFragmentDelivery(_) => PeerPhase::WaitForFragmentDelivery,
            Self::Disposed => PeerPhase::Disposed,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        match self {
            Self::WaitForJoinResponse(w) => Some(w.id),
            Self::WaitForRegistration(w) => Some(w.id),
            Self::WaitForFragmentDelivery(w) => Some(w.id),
            Self::Initializing | Self::Idle | Self::Disposed => None,
        }
    }

    /// Cancel the timer of a waiting phase, if any.
    pub fn cancel_timeout(self) {
        match self {
            Self::WaitForJoinResponse(w) => w.timeout.cancel(),
            Self::WaitForRegistration(w) => w.timeout.cancel(),
            Self::WaitForFragmentDelivery(w) => w.timeout.cancel(),
            Self::Initializing | Self::Idle | Self::Disposed => {}
        }
    }
}

/// Observable phase of a peer, without the phase data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    Initializing,
    WaitForJoinResponse,
    WaitForRegistration,
    Idle,
    WaitForFragmentDelivery,
    Disposed,
}

impl fmt::Display for PeerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything the coordinator lock protects.
pub struct PeerCore {
    pub state: PeerState,
    pub map: DistributionMap,
    pub catalog: Box<dyn PersistentCatalog>,
    /// Endpoints of the last `initialize` call; `None` until then.
    pub endpoints: Option<Vec<String>>,
    /// Fragment size the network runs with, once known.
    pub fragment_size: Option<i64>,
    /// Fragment whose delivery wait timed out before its distribution
    /// ended. A late delivery of it is still accepted.
    pub lapsed: Option<ExpectedFragment>,
    joined: Option<JoinResult>,
    next_session: u64,
}

impl PeerCore {
    #[must_use]
    pub fn new(catalog: Box<dyn PersistentCatalog>) -> Self {
        Self {
            state: PeerState::Initializing,
            map: DistributionMap::new(),
            catalog,
            endpoints: None,
            fragment_size: None,
            lapsed: None,
            joined: None,
            next_session: 0,
        }
    }

    /// `write_when` predicate: no phase in flight.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(
            self.state,
            PeerState::Initializing | PeerState::Idle | PeerState::Disposed
        )
    }

    /// Registered with the tracker and holding a committed catalog.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        matches!(
            self.state,
            PeerState::Idle | PeerState::WaitForFragmentDelivery(_)
        )
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self.state, PeerState::Disposed)
    }

    pub fn next_session_id(&mut self) -> u64 {
        self.next_session += 1;
        self.next_session
    }

    /// Move to `next` if session `id` is current, yielding the old state.
    pub fn take_session(&mut self, id: u64, next: PeerState) -> Option<PeerState> {
        if self.state.session_id() == Some(id) {
            Some(mem::replace(&mut self.state, next))
        } else {
            None
        }
    }

    /// Take the lapsed delivery wait for `hash`, if that is the one.
    pub fn take_lapsed(&mut self, hash: &str) -> Option<ExpectedFragment> {
        if self.lapsed.as_ref().is_some_and(|lapsed| lapsed.hash == hash) {
            self.lapsed.take()
        } else {
            None
        }
    }

    /// Install the waiter of an `initialize` call, failing any previous one.
    pub fn await_join(&mut self, waiter: JoinResult) {
        if let Some(previous) = self.joined.replace(waiter) {
            let _ = previous.send(Err(PeerError::Aborted));
        }
    }

    /// Complete the pending `initialize` call, if any.
    pub fn resolve_join(&mut self, result: Result<(), PeerError>) {
        if let Some(waiter) = self.joined.take() {
            let _ = waiter.send(result);
        }
    }
}

impl fmt::Debug for PeerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerCore")
            .field("state", &self.state.phase())
            .field("endpoints", &self.endpoints)
            .field("fragment_size", &self.fragment_size)
            .field("lapsed", &self.lapsed)
            .finish_non_exhaustive()
    }
}
