//! Read-through / write-through cache of each player's ignore set.
//!
//! A miss loads the player's whole ignore set in one query, so later checks for
//! the same player need no storage at all. A cached set is always complete:
//! it is only ever created from a full load.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;

use super::ttl::TtlCache;
use crate::core::clock::Clock;
use crate::core::model::PlayerId;
use crate::core::storage::StorageBackend;

pub struct IgnoreCache {
    sets: TtlCache<PlayerId, HashSet<PlayerId>>,
    storage: Arc<dyn StorageBackend>,
}

impl IgnoreCache {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        capacity: usize,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sets: TtlCache::new(capacity, ttl, clock),
            storage,
        }
    }

    /// Does `player` ignore `other`? A failed load answers `false` and caches nothing.
    pub fn is_ignored(&self, player: PlayerId, other: PlayerId) -> bool {
        self.ignored_by(player)
            .is_some_and(|set| set.contains(&other))
    }

    /// Full ignore set of `player`, loading it on a miss.
    pub fn ignored_by(&self, player: PlayerId) -> Option<HashSet<PlayerId>> {
        if let Some(set) = self.sets.get(&player) {
            return Some(set);
        }
        self.load(player)
    }

    /// Full storage read; cached unless a write for `player` landed meanwhile.
    fn load(&self, player: PlayerId) -> Option<HashSet<PlayerId>> {
        let generation = self.sets.generation(&player);
        let set = self.storage.fetch_ignores(player)?;
        self.sets.put_if_current(player, set.clone(), generation);
        Some(set)
    }

    pub fn add_ignore(&self, player: PlayerId, other: PlayerId) -> bool {
        if !self.storage.add_ignore(player, other) {
            return false;
        }
        self.sets.bump(player);
        if !self.sets.update(&player, |set| {
            set.insert(other);
        }) {
            // Seed from storage rather than from this one pair
            self.load(player);
        }
        true
    }

    /// Nothing cached means nothing to patch; the next read loads the new state.
    pub fn remove_ignore(&self, player: PlayerId, other: PlayerId) -> bool {
        if !self.storage.remove_ignore(player, other) {
            return false;
        }
        self.sets.bump(player);
        self.sets.update(&player, |set| {
            set.remove(&other);
        });
        true
    }

    pub fn invalidate(&self, player: PlayerId) {
        self.sets.invalidate(&player);
    }

    pub fn is_cached(&self, player: PlayerId) -> bool {
        self.sets.contains(&player)
    }

    pub fn purge_expired(&self) -> usize {
        self.sets.purge_expired()
    }
}
