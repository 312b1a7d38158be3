//! Tracker phases and the records each waiting phase owns.

use super::join::JoinPlan;
use crate::error::TrackerError;
use fd_01_distribution_map::DistributionMap;
use fd_02_coordinator_lock::TimeoutHandle;
use shared_types::{ContentHash, PeerId};
use std::collections::BTreeSet;
use std::fmt;
use std::mem;
use tokio::sync::oneshot;

/// Completion channel of a `distribute_fragment` call.
pub type DistributionResult = oneshot::Sender<Result<Vec<String>, TrackerError>>;

/// A waiting phase: a unique session id, its timer, and phase data.
///
/// Timer continuations carry the id and act only if the phase they were
/// scheduled for is still current.
#[derive(Debug)]
pub struct Waiting<T> {
    pub id: u64,
    pub timeout: TimeoutHandle,
    pub data: T,
}

/// A join accepted and awaiting the peer's confirmation.
#[derive(Debug)]
pub struct PendingJoin {
    pub client_id: PeerId,
    pub endpoints: Vec<String>,
    pub plan: JoinPlan,
}

/// A fragment announced and collecting volunteers.
#[derive(Debug)]
pub struct PendingRequests {
    pub hash: ContentHash,
    pub data: Vec<u8>,
    pub requestors: BTreeSet<PeerId>,
    pub result: DistributionResult,
}

/// A fragment delivered and collecting outcomes.
#[derive(Debug)]
pub struct PendingDelivery {
    pub hash: ContentHash,
    pub size: i64,
    /// Receivers that have not answered yet.
    pub open: BTreeSet<PeerId>,
    pub confirmed: BTreeSet<PeerId>,
    pub result: DistributionResult,
}

#[derive(Debug, Default)]
pub enum TrackerState {
    #[default]
    Idle,
    WaitForJoinResponse(Waiting<PendingJoin>),
    WaitForDistributionRequests(Waiting<PendingRequests>),
    WaitForDistributionDelivery(Waiting<PendingDelivery>),
    Disposed,
}

impl TrackerState {
    #[must_use]
    pub fn phase(&self) -> TrackerPhase {
        match self {
            Self::Idle => TrackerPhase::Idle,
            Self::WaitForJoinResponse(_) => TrackerPhase::WaitForJoinResponse,
            Self::WaitForDistributionRequests(_) => TrackerPhase::WaitForDistributionRequests,
            Self::WaitForDistributionDelivery(_) => TrackerPhase::WaitForDistributionDelivery,
            Self::Disposed => TrackerPhase::Disposed,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        match self {
            Self::WaitForJoinResponse(w) => Some(w.id),
            Self::WaitForDistributionRequests(w) => Some(w.id),
            Self::WaitForDistributionDelivery(w) => Some(w.id),
            Self::Idle | Self::Disposed => None,
        }
    }
}

/// Observable phase of a tracker, without the phase data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    WaitForJoinResponse,
    WaitForDistributionRequests,
    WaitForDistributionDelivery,
    Disposed,
}

impl fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything the coordinator lock protects.
#[derive(Debug, Default)]
pub struct TrackerCore {
    pub state: TrackerState,
    pub map: DistributionMap,
    next_session: u64,
}

impl TrackerCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `write_when` predicate: no phase in flight.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self.state, TrackerState::Idle | TrackerState::Disposed)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self.state, TrackerState::Disposed)
    }

    pub fn next_session_id(&mut self) -> u64 {
        self.next_session += 1;
        self.next_session
    }

    /// Return to `Idle` if session `id` is current, yielding its state.
    pub fn take_session(&mut self, id: u64) -> Option<TrackerState> {
        if self.state.session_id() == Some(id) {
            Some(mem::replace(&mut self.state, TrackerState::Idle))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_take_session_matches_id_only() {
        let mut core = TrackerCore::new();
        let id = core.next_session_id();
        core.state = TrackerState::WaitForJoinResponse(Waiting {
            id,
            timeout: TimeoutHandle::schedule(Duration::from_secs(60), async {}),
            data: PendingJoin {
                client_id: "p1".into(),
                endpoints: vec![],
                plan: JoinPlan::default(),
            },
        });

        assert!(core.take_session(id + 1).is_none());
        assert_eq!(core.state.phase(), TrackerPhase::WaitForJoinResponse);
        assert!(!core.is_settled());

        assert!(matches!(
            core.take_session(id),
            Some(TrackerState::WaitForJoinResponse(_))
        ));
        assert_eq!(core.state.phase(), TrackerPhase::Idle);
        assert!(core.is_settled());
    }

    #[test]
    fn test_session_ids_increase() {
        let mut core = TrackerCore::new();
        let first = core.next_session_id();
        assert!(core.next_session_id() > first);
    }
}
