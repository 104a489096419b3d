// Per-mentioner rate limiting. Purely in memory, never persisted.
//
// Cleanup is two-phase: lapsed entries are marked (lazily by the read path, or
// when a player leaves), and the periodic sweep removes marked entries after
// re-checking that they are still lapsed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use super::clock::Clock;
use super::model::PlayerId;

pub struct CooldownTracker {
    /// Instant until which mentions from the player are suppressed
    cooldowns: DashMap<PlayerId, DateTime<Utc>>,
    marked: DashSet<PlayerId>,
    clock: Arc<dyn Clock>,
}

impl CooldownTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldowns: DashMap::new(),
            marked: DashSet::new(),
            clock,
        }
    }

    pub fn set_cooldown(&self, player: PlayerId, until: DateTime<Utc>) {
        self.cooldowns.insert(player, until);
    }

    /// Start a cooldown lasting until `until` unless one is still active.
    /// Check and write happen under the entry lock, so of several concurrent
    /// claims for one player exactly one succeeds.
    pub fn try_claim(&self, player: PlayerId, until: DateTime<Utc>) -> bool {
        let now = self.clock.now();
        match self.cooldowns.entry(player) {
            Entry::Occupied(mut entry) => {
                if now < *entry.get() {
                    return false;
                }
                entry.insert(until);
            }
            Entry::Vacant(entry) => {
                entry.insert(until);
            }
        }
        true
    }

    /// True while now is strictly before the stored expiry.
    /// A lapsed entry seen here is marked for the next sweep.
    pub fn is_on_cooldown(&self, player: PlayerId) -> bool {
        let now = self.clock.now();
        let active = match self.cooldowns.get(&player) {
            None => return false,
            Some(until) => now < *until,
        };
        if !active {
            self.marked.insert(player);
        }
        active
    }

    pub fn cooldown_until(&self, player: PlayerId) -> Option<DateTime<Utc>> {
        self.cooldowns.get(&player).map(|until| *until)
    }

    pub fn remove_cooldown(&self, player: PlayerId) {
        self.cooldowns.remove(&player);
    }

    pub fn mark_for_removal(&self, player: PlayerId) {
        self.marked.insert(player);
    }

    pub fn unmark_for_removal(&self, player: PlayerId) {
        self.marked.remove(&player);
    }

    pub fn is_marked_for_removal(&self, player: PlayerId) -> bool {
        self.marked.contains(&player)
    }

    pub fn tracked(&self) -> usize {
        self.cooldowns.len()
    }

    pub fn marked(&self) -> usize {
        self.marked.len()
    }

    /// Reap marked entries whose cooldown has lapsed. Marked entries still on
    /// cooldown (a fresh mention raced the mark) stay for a later pass.
    /// Returns the number of players reaped.
    pub fn sweep(&self) -> usize {
        if self.marked.is_empty() {
            return 0;
        }
        let candidates: Vec<PlayerId> = self.marked.iter().map(|id| *id).collect();
        let mut reaped = 0;
        for player in candidates {
            if self.is_on_cooldown(player) {
                continue;
            }
            let now = self.clock.now();
            // Only drop the entry if no fresh cooldown landed since the check
            self.cooldowns.remove_if(&player, |_, until| now >= *until);
            if !self.cooldowns.contains_key(&player) {
                self.unmark_for_removal(player);
                reaped += 1;
            }
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use chrono::Duration;
    use uuid::Uuid;

    fn tracker() -> (Arc<ManualClock>, CooldownTracker) {
        let clock = Arc::new(ManualClock::default());
        let tracker = CooldownTracker::new(clock.clone());
        (clock, tracker)
    }

    #[test]
    fn test_cooldown_is_strictly_before_expiry() {
        let (clock, tracker) = tracker();
        let id = Uuid::new_v4();
        assert!(!tracker.is_on_cooldown(id));

        tracker.set_cooldown(id, clock.now() + Duration::seconds(3));
        assert!(tracker.is_on_cooldown(id));

        clock.advance(Duration::milliseconds(2999));
        assert!(tracker.is_on_cooldown(id));

        clock.advance(Duration::milliseconds(1));
        assert!(!tracker.is_on_cooldown(id));
    }

    #[test]
    fn test_lapsed_read_marks_entry() {
        let (clock, tracker) = tracker();
        let id = Uuid::new_v4();
        tracker.set_cooldown(id, clock.now() + Duration::seconds(3));

        assert!(tracker.is_on_cooldown(id));
        assert!(!tracker.is_marked_for_removal(id));

        clock.advance(Duration::seconds(3));
        assert!(!tracker.is_on_cooldown(id));
        assert!(tracker.is_marked_for_removal(id));
    }

    #[test]
    fn test_sweep_reaps_only_marked_and_lapsed() {
        let (clock, tracker) = tracker();
        let (lapsed, active, unmarked) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let start = clock.now();
        tracker.set_cooldown(lapsed, start + Duration::seconds(1));
        tracker.set_cooldown(active, start + Duration::seconds(60));
        tracker.set_cooldown(unmarked, start + Duration::seconds(1));
        tracker.mark_for_removal(lapsed);
        tracker.mark_for_removal(active);

        clock.advance(Duration::seconds(5));
        assert_eq!(tracker.sweep(), 1);

        assert!(tracker.cooldown_until(lapsed).is_none());
        assert!(!tracker.is_marked_for_removal(lapsed));
        assert!(tracker.is_marked_for_removal(active));
        assert!(tracker.cooldown_until(active).is_some());
        assert!(tracker.cooldown_until(unmarked).is_some());
    }

    #[test]
    fn test_refreshed_cooldown_survives_sweep() {
        let (clock, tracker) = tracker();
        let id = Uuid::new_v4();
        tracker.set_cooldown(id, clock.now() + Duration::seconds(1));
        tracker.mark_for_removal(id);

        clock.advance(Duration::seconds(2));
        tracker.set_cooldown(id, clock.now() + Duration::seconds(3));
        assert_eq!(tracker.sweep(), 0);
        assert!(tracker.is_on_cooldown(id));

        clock.advance(Duration::seconds(3));
        assert_eq!(tracker.sweep(), 1);
        assert_eq!(tracker.tracked(), 0);
        assert_eq!(tracker.marked(), 0);
    }

    #[test]
    fn test_claim_only_when_not_cooling_down() {
        let (clock, tracker) = tracker();
        let id = Uuid::new_v4();
        let first = clock.now() + Duration::seconds(3);

        assert!(tracker.try_claim(id, first));
        assert!(!tracker.try_claim(id, clock.now() + Duration::seconds(10)));
        assert_eq!(tracker.cooldown_until(id), Some(first));

        clock.advance(Duration::seconds(3));
        let second = clock.now() + Duration::seconds(3);
        assert!(tracker.try_claim(id, second));
        assert_eq!(tracker.cooldown_until(id), Some(second));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let (clock, tracker) = tracker();
        let id = Uuid::new_v4();
        let until = clock.now() + Duration::seconds(3);
        let start = std::sync::Barrier::new(8);

        let wins: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        start.wait();
                        usize::from(tracker.try_claim(id, until))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_sweep_unmarks_players_without_entry() {
        let (_clock, tracker) = tracker();
        let id = Uuid::new_v4();
        tracker.mark_for_removal(id);

        assert_eq!(tracker.sweep(), 1);
        assert!(!tracker.is_marked_for_removal(id));
    }
}
