//! Peer domain: phases and volunteer admission.

pub mod policy;
pub mod state;

pub use policy::{AcceptAll, AdmissionPolicy};
pub use state::{ExpectedFragment, JoinResult, PeerCore, PeerPhase, PeerState, Waiting};
