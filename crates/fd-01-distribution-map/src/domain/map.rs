//! # Distribution Map
//!
//! Three keyed collections plus the union of all peer endpoints.
//!
//! Additions are idempotent: adding an existing key returns `false` and
//! leaves the map untouched, so replaying an event is always safe. Removals
//! cascade so that fragment owner sets and peer stored sets stay mirrored.

use super::entities::{FragmentInfo, FragmentedFileInfo, PeerInfo};
use shared_types::{ContentHash, PeerId};
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

/// A node's view of files, fragments and peers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionMap {
    files: HashMap<ContentHash, FragmentedFileInfo>,
    fragments: HashMap<ContentHash, FragmentInfo>,
    peers: HashMap<PeerId, PeerInfo>,
    endpoints: BTreeSet<String>,
}

impl DistributionMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // ADDITIONS
    // =========================================================================

    /// Add a file. Returns `false` if the hash is already known.
    pub fn try_add_file(&mut self, info: FragmentedFileInfo) -> bool {
        if self.files.contains_key(info.hash()) {
            return false;
        }
        trace!(file = %info.hash(), size = info.size(), "File added");
        self.files.insert(info.hash().to_string(), info);
        true
    }

    /// Add a fragment. Returns `false` if the hash is already known or the
    /// size is not positive.
    ///
    /// Peers that already list the fragment as stored become its owners.
    pub fn try_add_fragment(&mut self, hash: impl Into<ContentHash>, size: i64) -> bool {
        let hash = hash.into();
        if self.fragments.contains_key(&hash) {
            return false;
        }
        let Ok(mut info) = FragmentInfo::new(hash.clone(), size) else {
            return false;
        };
        info.owners = self
            .peers
            .values()
            .filter(|peer| peer.stored_fragments.contains(&hash))
            .map(|peer| peer.id().to_string())
            .collect();
        trace!(fragment = %hash, size, owners = info.owners.len(), "Fragment added");
        self.fragments.insert(hash, info);
        true
    }

    /// Add a peer. Returns `false` if the id is already registered.
    ///
    /// Known fragments among `stored_fragments` gain the peer as owner.
    pub fn try_add_peer(
        &mut self,
        id: impl Into<PeerId>,
        endpoints: impl IntoIterator<Item = String>,
        stored_fragments: impl IntoIterator<Item = ContentHash>,
    ) -> bool {
        let peer = PeerInfo::new(id, endpoints, stored_fragments);
        if self.peers.contains_key(peer.id()) {
            return false;
        }
        for hash in &peer.stored_fragments {
            if let Some(fragment) = self.fragments.get_mut(hash) {
                fragment.owners.insert(peer.id().to_string());
            }
        }
        self.endpoints.extend(peer.endpoints().iter().cloned());
        trace!(peer = %peer.id(), endpoints = peer.endpoints().len(), "Peer added");
        self.peers.insert(peer.id().to_string(), peer);
        true
    }

    /// Record that `peer_id` stores `fragment_hash`.
    ///
    /// Unknown fragment or peer is a no-op. Returns `true` if an edge was added.
    pub fn try_add_fragment_to_peer(&mut self, fragment_hash: &str, peer_id: &str) -> bool {
        let (Some(fragment), Some(peer)) = (
            self.fragments.get_mut(fragment_hash),
            self.peers.get_mut(peer_id),
        ) else {
            return false;
        };
        let added = fragment.owners.insert(peer_id.to_string());
        peer.stored_fragments.insert(fragment_hash.to_string());
        added
    }

    /// Record that every peer in `peer_ids` stores `fragment_hash`.
    ///
    /// Returns the number of edges added.
    pub fn try_add_fragment_to_peers<'a>(
        &mut self,
        fragment_hash: &str,
        peer_ids: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        peer_ids
            .into_iter()
            .filter(|peer_id| self.try_add_fragment_to_peer(fragment_hash, peer_id))
            .count()
    }

    // =========================================================================
    // REMOVALS
    // =========================================================================

    /// Remove a file. Its fragments are kept.
    pub fn remove_file(&mut self, hash: &str) -> bool {
        self.files.remove(hash).is_some()
    }

    /// Remove a fragment and strip it from every peer's stored set.
    pub fn remove_fragment(&mut self, hash: &str) -> bool {
        if self.fragments.remove(hash).is_none() {
            return false;
        }
        for peer in self.peers.values_mut() {
            peer.stored_fragments.remove(hash);
        }
        true
    }

    /// Remove a peer and strip it from every fragment's owner set.
    ///
    /// Fragments are kept even when left without owners.
    pub fn remove_peer(&mut self, id: &str) -> bool {
        let Some(peer) = self.peers.remove(id) else {
            return false;
        };
        for hash in &peer.stored_fragments {
            if let Some(fragment) = self.fragments.get_mut(hash) {
                fragment.owners.remove(id);
            }
        }
        self.endpoints = self
            .peers
            .values()
            .flat_map(|p| p.endpoints().iter().cloned())
            .collect();
        trace!(peer = %id, "Peer removed");
        true
    }

    /// Reset to empty.
    pub fn clear(&mut self) {
        self.files.clear();
        self.fragments.clear();
        self.peers.clear();
        self.endpoints.clear();
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    #[must_use]
    pub fn contains_file(&self, hash: &str) -> bool {
        self.files.contains_key(hash)
    }

    #[must_use]
    pub fn contains_fragment(&self, hash: &str) -> bool {
        self.fragments.contains_key(hash)
    }

    #[must_use]
    pub fn contains_peer(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    #[must_use]
    pub fn try_get_file(&self, hash: &str) -> Option<&FragmentedFileInfo> {
        self.files.get(hash)
    }

    #[must_use]
    pub fn try_get_fragment(&self, hash: &str) -> Option<&FragmentInfo> {
        self.fragments.get(hash)
    }

    #[must_use]
    pub fn try_get_peer(&self, id: &str) -> Option<&PeerInfo> {
        self.peers.get(id)
    }

    pub fn files(&self) -> impl Iterator<Item = &FragmentedFileInfo> {
        self.files.values()
    }

    pub fn fragments(&self) -> impl Iterator<Item = &FragmentInfo> {
        self.fragments.values()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.values()
    }

    /// Union of all registered peers' endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &BTreeSet<String> {
        &self.endpoints
    }

    /// The registered peer advertising `endpoint`, if any.
    #[must_use]
    pub fn peer_with_endpoint(&self, endpoint: &str) -> Option<&PeerInfo> {
        if !self.endpoints.contains(endpoint) {
            return None;
        }
        self.peers
            .values()
            .find(|peer| peer.endpoints().contains(endpoint))
    }

    /// Sorted fetch URIs of `hash` across all its owners.
    ///
    /// Returns `None` if the fragment is unknown.
    #[must_use]
    pub fn fragment_uris(&self, hash: &str) -> Option<Vec<String>> {
        let fragment = self.fragments.get(hash)?;
        let mut uris: Vec<String> = fragment
            .owners
            .iter()
            .filter_map(|owner| self.peers.get(owner))
            .flat_map(|peer| peer.fragment_uris(hash))
            .collect();
        uris.sort();
        Some(uris)
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}
