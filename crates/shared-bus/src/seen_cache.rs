//! # Seen Event Cache
//!
//! Remembers processed event identifiers so that redelivered messages are
//! handled at most once per node.
//!
//! ## Bounds
//!
//! - Identifiers are retained for a time window (default 10 minutes)
//! - The number of retained identifiers is capped (default 100 000)
//! - When either bound is exceeded the oldest identifiers are evicted first

use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Bounded set of previously processed event identifiers.
#[derive(Debug)]
pub struct SeenEventCache {
    /// Identifiers in insertion order with their insertion time.
    order: VecDeque<(Uuid, Instant)>,

    /// Membership index over `order`.
    members: HashSet<Uuid>,

    /// How long an identifier is remembered.
    retention: Duration,

    /// Maximum number of remembered identifiers.
    capacity: usize,
}

impl SeenEventCache {
    /// Default retention window.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

    /// Default capacity.
    pub const DEFAULT_CAPACITY: usize = 100_000;

    /// Create a cache with default bounds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Self::DEFAULT_RETENTION, Self::DEFAULT_CAPACITY)
    }

    /// Create a cache with custom bounds. A zero capacity is treated as one.
    #[must_use]
    pub fn with_config(retention: Duration, capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            retention,
            capacity: capacity.max(1),
        }
    }

    /// Record `id` as seen.
    ///
    /// Returns `false` if `id` was already recorded and is still retained.
    pub fn insert(&mut self, id: Uuid) -> bool {
        let now = Instant::now();
        self.evict_expired(now);

        if self.members.contains(&id) {
            return false;
        }

        while self.order.len() >= self.capacity {
            if let Some((oldest, _)) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }

        self.order.push_back((id, now));
        self.members.insert(id);
        true
    }

    /// Check if `id` is currently remembered.
    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.members.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&(id, inserted)) = self.order.front() {
            if now.duration_since(inserted) < self.retention {
                break;
            }
            self.order.pop_front();
            self.members.remove(&id);
        }
    }
}

impl Default for SeenEventCache {
    fn default() -> Self {
        Self::new()
    }
}
