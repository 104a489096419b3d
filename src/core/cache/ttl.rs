//! Capacity-bounded map with expire-after-write.
//!
//! Entries carry the instant of their last write. A read past the TTL removes
//! the entry and reports a miss; nothing else is observable. Inserting into a
//! full cache first drops expired entries, then the oldest writes, in one batch
//! that leaves a tenth of the capacity free.
//!
//! # Read-through fills
//!
//! A loader that misses reads [`TtlCache::generation`] before going to storage
//! and inserts with [`TtlCache::put_if_current`]. Writers call
//! [`TtlCache::bump`] after storage accepted a write and before patching the
//! cache. A fill whose load started before the bump is dropped, so a slow read
//! can never replace a newer write with the row it saw.
//!
//! # Thread Safety
//!
//! Backed by `DashMap`, so each key is guarded by its shard lock. Mutations
//! through [`TtlCache::update`] run under that lock and can never tear a value.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::core::clock::Clock;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    written_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Stamp {
    generation: u64,
    bumped_at: DateTime<Utc>,
}

pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    /// Last write generation per key; 0 means never written
    generations: DashMap<K, Stamp>,
    next_generation: AtomicU64,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            next_generation: AtomicU64::new(1),
            capacity: capacity.max(1),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - written_at >= self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if !self.is_expired(entry.written_at, now) {
                return Some(entry.value.clone());
            }
        }
        // Re-checked under the write lock in case a fresh put landed meanwhile
        self.entries
            .remove_if(key, |_, entry| self.is_expired(entry.written_at, now));
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .is_some_and(|entry| !self.is_expired(entry.written_at, now))
    }

    /// Insert or replace, resetting the entry's expiry.
    pub fn put(&self, key: K, value: V) {
        let now = self.clock.now();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.make_room(now);
        }
        self.entries.insert(
            key,
            Entry {
                value,
                written_at: now,
            },
        );
    }

    /// Write generation of `key`, to be passed to [`TtlCache::put_if_current`].
    pub fn generation(&self, key: &K) -> u64 {
        self.generations
            .get(key)
            .map_or(0, |stamp| stamp.generation)
    }

    /// Record that storage accepted a write for `key`.
    /// Blocks while a fill for the same key is being inserted.
    pub fn bump(&self, key: K) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.generations.insert(
            key,
            Stamp {
                generation,
                bumped_at: self.clock.now(),
            },
        );
    }

    /// Insert a loaded value unless a write was recorded since `generation`
    /// was read. Returns whether the value was cached.
    pub fn put_if_current(&self, key: K, value: V, generation: u64) -> bool {
        // Held across the insert so a concurrent bump orders after it
        let current = self.generations.get(&key);
        if current.as_ref().map_or(0, |stamp| stamp.generation) != generation {
            return false;
        }
        self.put(key, value);
        drop(current);
        true
    }

    /// Mutate a live entry in place and reset its expiry.
    /// Returns `false`, without calling `f`, when nothing live is cached.
    pub fn update(&self, key: &K, f: impl FnOnce(&mut V)) -> bool {
        let now = self.clock.now();
        let expired = match self.entries.get_mut(key) {
            None => return false,
            Some(mut entry) => {
                if self.is_expired(entry.written_at, now) {
                    true
                } else {
                    f(&mut entry.value);
                    entry.written_at = now;
                    return true;
                }
            }
        };
        if expired {
            self.entries
                .remove_if(key, |_, entry| self.is_expired(entry.written_at, now));
        }
        false
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every expired entry, and write stamps older than the TTL.
    /// Returns how many entries were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !self.is_expired(entry.written_at, now));
        // No fill can still be waiting on a load that started a full TTL ago
        self.generations
            .retain(|_, stamp| !self.is_expired(stamp.bumped_at, now));
        before.saturating_sub(self.entries.len())
    }

    fn make_room(&self, now: DateTime<Utc>) {
        self.entries
            .retain(|_, entry| !self.is_expired(entry.written_at, now));
        if self.entries.len() < self.capacity {
            return;
        }
        let target = self
            .capacity
            .saturating_sub((self.capacity / 10).max(1));
        let mut by_age: Vec<(DateTime<Utc>, K)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().written_at, entry.key().clone()))
            .collect();
        by_age.sort_unstable_by_key(|(written_at, _)| *written_at);
        let excess = by_age.len().saturating_sub(target);
        for (_, key) in by_age.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn cache(capacity: usize, ttl_secs: i64) -> (Arc<ManualClock>, TtlCache<u32, String>) {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new(capacity, Duration::seconds(ttl_secs), clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (clock, cache) = cache(10, 60);
        cache.put(1, "one".to_string());

        clock.advance(Duration::seconds(59));
        assert_eq!(cache.get(&1), Some("one".to_string()));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty(), "expired read removes the entry");
    }

    #[test]
    fn test_update_resets_expiry() {
        let (clock, cache) = cache(10, 60);
        cache.put(1, "one".to_string());

        clock.advance(Duration::seconds(50));
        assert!(cache.update(&1, |v| v.push('!')));

        clock.advance(Duration::seconds(50));
        assert_eq!(cache.get(&1), Some("one!".to_string()));
    }

    #[test]
    fn test_update_skips_missing_and_expired() {
        let (clock, cache) = cache(10, 60);
        assert!(!cache.update(&1, |_| panic!("must not run")));

        cache.put(2, "two".to_string());
        clock.advance(Duration::seconds(60));
        assert!(!cache.update(&2, |_| panic!("must not run")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_cache_evicts_oldest_write() {
        let (clock, cache) = cache(2, 600);
        cache.put(1, "one".to_string());
        clock.advance(Duration::seconds(1));
        cache.put(2, "two".to_string());
        clock.advance(Duration::seconds(1));
        cache.put(3, "three".to_string());

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(cache.contains(&3));
    }

    #[test]
    fn test_full_cache_prefers_dropping_expired() {
        let (clock, cache) = cache(2, 60);
        cache.put(1, "one".to_string());
        clock.advance(Duration::seconds(30));
        cache.put(2, "two".to_string());
        clock.advance(Duration::seconds(31));
        cache.put(3, "three".to_string());

        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(cache.contains(&3));
    }

    #[test]
    fn test_replacing_existing_key_does_not_evict() {
        let (_clock, cache) = cache(2, 60);
        cache.put(1, "one".to_string());
        cache.put(2, "two".to_string());
        cache.put(2, "deux".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), Some("one".to_string()));
        assert_eq!(cache.get(&2), Some("deux".to_string()));
    }

    #[test]
    fn test_purge_expired_counts_removed() {
        let (clock, cache) = cache(10, 60);
        cache.put(1, "one".to_string());
        cache.put(2, "two".to_string());
        clock.advance(Duration::seconds(61));
        cache.put(3, "three".to_string());

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_frees_a_batch() {
        let (clock, cache) = cache(20, 600);
        for key in 0..20 {
            cache.put(key, key.to_string());
            clock.advance(Duration::seconds(1));
        }

        cache.put(100, "new".to_string());
        assert_eq!(cache.len(), 19);
        assert!(!cache.contains(&0));
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(cache.contains(&100));

        // Room left over: the next insert evicts nothing
        cache.put(101, "next".to_string());
        assert_eq!(cache.len(), 20);
        assert!(cache.contains(&2));
    }

    #[test]
    fn test_fill_after_write_is_dropped() {
        let (_clock, cache) = cache(10, 60);
        let loaded_at = cache.generation(&1);
        cache.bump(1);

        assert!(!cache.put_if_current(1, "stale".to_string(), loaded_at));
        assert!(!cache.contains(&1));

        let fresh = cache.generation(&1);
        assert!(cache.put_if_current(1, "fresh".to_string(), fresh));
        assert_eq!(cache.get(&1), Some("fresh".to_string()));
    }

    #[test]
    fn test_write_stamps_are_purged_after_ttl() {
        let (clock, cache) = cache(10, 60);
        cache.bump(1);
        assert_ne!(cache.generation(&1), 0);

        clock.advance(Duration::seconds(60));
        cache.purge_expired();
        assert_eq!(cache.generation(&1), 0);
    }
}
