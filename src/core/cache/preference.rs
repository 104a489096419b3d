//! Read-through / write-through cache of player preference records.
//!
//! Writes go to storage first; the cached copy only changes after storage
//! accepted the write, so the cache is never ahead of durable state. A cache
//! miss on update is left alone, and the next read reloads the updated row.

use std::sync::Arc;

use chrono::Duration;

use super::ttl::TtlCache;
use crate::core::clock::Clock;
use crate::core::model::{DisplayMode, PlayerId, PlayerRecord, PreferenceMode, RecordUpdate};
use crate::core::storage::StorageBackend;

pub struct PreferenceCache {
    records: TtlCache<PlayerId, PlayerRecord>,
    storage: Arc<dyn StorageBackend>,
}

impl PreferenceCache {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        capacity: usize,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            records: TtlCache::new(capacity, ttl, clock),
            storage,
        }
    }

    /// Cached record, or a storage read that populates the cache when found.
    /// The row is not cached if a write for the player landed during the read.
    pub fn get(&self, player: PlayerId) -> Option<PlayerRecord> {
        if let Some(record) = self.records.get(&player) {
            return Some(record);
        }
        let generation = self.records.generation(&player);
        let record = self.storage.fetch_record(player)?;
        self.records
            .put_if_current(player, record.clone(), generation);
        Some(record)
    }

    pub fn put(&self, player: PlayerId, record: PlayerRecord) {
        self.records.put(player, record);
    }

    pub fn invalidate(&self, player: PlayerId) {
        self.records.invalidate(&player);
    }

    pub fn is_cached(&self, player: PlayerId) -> bool {
        self.records.contains(&player)
    }

    /// Persist a new record, then cache it. Nothing is cached if storage refused it.
    pub fn add(&self, record: PlayerRecord) -> bool {
        if !self.storage.add_record(&record) {
            return false;
        }
        self.records.bump(record.player_id);
        self.records.put(record.player_id, record);
        true
    }

    /// Write the change through to storage, then patch the cached copy if there is one.
    pub fn update(&self, player: PlayerId, update: &RecordUpdate) -> bool {
        if !self.storage.update_record(player, update) {
            return false;
        }
        self.records.bump(player);
        self.records.update(&player, |record| update.apply(record));
        true
    }

    pub fn update_sound(&self, player: PlayerId, sound: &str) -> bool {
        self.update(player, &RecordUpdate::Sound(sound.to_string()))
    }

    pub fn update_display(&self, player: PlayerId, display: DisplayMode) -> bool {
        self.update(player, &RecordUpdate::Display(display))
    }

    pub fn update_preference(&self, player: PlayerId, preference: PreferenceMode) -> bool {
        self.update(player, &RecordUpdate::Preference(preference))
    }

    pub fn update_all(
        &self,
        player: PlayerId,
        sound: &str,
        display: DisplayMode,
        preference: PreferenceMode,
    ) -> bool {
        self.update(
            player,
            &RecordUpdate::All {
                sound: sound.to_string(),
                display,
                preference,
            },
        )
    }

    pub fn remove(&self, player: PlayerId) -> bool {
        if !self.storage.remove_record(player) {
            return false;
        }
        self.records.bump(player);
        self.records.invalidate(&player);
        true
    }

    pub fn purge_expired(&self) -> usize {
        self.records.purge_expired()
    }
}
