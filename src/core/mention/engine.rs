// Mention engine - decides whether a mention notifies its target and through
// which channels, and manages the per-mentioner cooldown.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::dispatch::{Channels, CombatOracle, MentionDispatcher, MentionNotification, SoundCue};
use crate::core::cache::{IgnoreCache, PreferenceCache};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{MentionSettings, Settings};
use crate::core::cooldown::CooldownTracker;
use crate::core::model::{DisplayMode, PlayerId, PlayerRecord, PreferenceMode};
use crate::core::storage::StorageBackend;

/// Why a handled mention produced no notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Target prefers `NEVER`
    Disabled,
    /// Target prefers `NEVER_IN_COMBAT` and is fighting
    InCombat,
}

/// Result of evaluating one mention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionOutcome {
    /// Dispatched; `silent` means the sound channel was dropped
    Notified { silent: bool },
    /// Mentioner is on the target's ignore list
    Ignored,
    Suppressed(SuppressReason),
    /// Mentioner is rate limited
    OnCooldown,
    /// Target has no preference record
    MissingRecord,
}

impl MentionOutcome {
    /// Whether the caller should treat the mention as delivered.
    /// Ignored and suppressed mentions look exactly like notified ones here.
    pub fn is_handled(&self) -> bool {
        match self {
            Self::Notified { .. } | Self::Ignored | Self::Suppressed(_) => true,
            Self::OnCooldown | Self::MissingRecord => false,
        }
    }
}

/// What one [`MentionEngine::sweep`] removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub cooldowns: usize,
    pub preferences: usize,
    pub ignores: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.cooldowns + self.preferences + self.ignores
    }
}

pub struct MentionEngine {
    preferences: PreferenceCache,
    ignores: IgnoreCache,
    cooldowns: Arc<CooldownTracker>,
    combat: Arc<dyn CombatOracle>,
    dispatcher: Arc<dyn MentionDispatcher>,
    clock: Arc<dyn Clock>,
    settings: MentionSettings,
}

impl MentionEngine {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        settings: &Settings,
        combat: Arc<dyn CombatOracle>,
        dispatcher: Arc<dyn MentionDispatcher>,
    ) -> Self {
        Self::with_clock(storage, settings, combat, dispatcher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage: Arc<dyn StorageBackend>,
        settings: &Settings,
        combat: Arc<dyn CombatOracle>,
        dispatcher: Arc<dyn MentionDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = &settings.cache;
        Self {
            preferences: PreferenceCache::new(
                storage.clone(),
                cache.capacity,
                seconds(cache.preference_ttl_seconds),
                clock.clone(),
            ),
            ignores: IgnoreCache::new(
                storage,
                cache.capacity,
                seconds(cache.ignore_ttl_seconds),
                clock.clone(),
            ),
            cooldowns: Arc::new(CooldownTracker::new(clock.clone())),
            combat,
            dispatcher,
            clock,
            settings: settings.mentions.clone(),
        }
    }

    pub fn preferences(&self) -> &PreferenceCache {
        &self.preferences
    }

    pub fn ignores(&self) -> &IgnoreCache {
        &self.ignores
    }

    /// Shared with the sweeper task
    pub fn cooldowns(&self) -> Arc<CooldownTracker> {
        Arc::clone(&self.cooldowns)
    }

    /// Handle a mention of `target` by `mentioner`.
    /// Returns true when the caller should treat the mention as delivered.
    pub fn mention_player(&self, target: PlayerId, mentioner: PlayerId) -> bool {
        self.evaluate(target, mentioner).is_handled()
    }

    /// Run the decision rules in order; the first that applies wins.
    pub fn evaluate(&self, target: PlayerId, mentioner: PlayerId) -> MentionOutcome {
        let Some(record) = self.preferences.get(target) else {
            log::error!("Preference record not found for mentioned player {}", target);
            return MentionOutcome::MissingRecord;
        };

        if self.ignores.is_ignored(target, mentioner) {
            return MentionOutcome::Ignored;
        }

        if self.cooldowns.is_on_cooldown(mentioner) {
            return MentionOutcome::OnCooldown;
        }

        let silent = match record.preference {
            PreferenceMode::Always => false,
            PreferenceMode::SilentInCombat => self.combat.in_combat(target),
            PreferenceMode::NeverInCombat => {
                if self.combat.in_combat(target) {
                    return MentionOutcome::Suppressed(SuppressReason::InCombat);
                }
                false
            }
            PreferenceMode::Never => return MentionOutcome::Suppressed(SuppressReason::Disabled),
        };

        // Concurrent mentions by the same player all pass the check above;
        // only the one that claims the cooldown goes on to notify
        if !self.claim_cooldown(mentioner) {
            return MentionOutcome::OnCooldown;
        }
        self.fire(&record, mentioner, silent);
        MentionOutcome::Notified { silent }
    }

    /// Always succeeds when rate limiting is disabled.
    fn claim_cooldown(&self, mentioner: PlayerId) -> bool {
        let cooldown = self.settings.cooldown_seconds;
        if cooldown < 1 {
            return true;
        }
        let now = self.clock.now();
        let until = Duration::try_seconds(cooldown)
            .and_then(|length| now.checked_add_signed(length))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.cooldowns.try_claim(mentioner, until)
    }

    fn fire(&self, record: &PlayerRecord, mentioner: PlayerId, silent: bool) {
        let cue = SoundCue {
            key: record.sound.clone(),
            volume: self.settings.volume,
            pitch: self.settings.pitch,
        };
        let channels = Channels::for_display(record.display, silent, cue);
        if !channels.is_empty() {
            self.dispatcher.dispatch(&MentionNotification {
                target: record.player_id,
                mentioner,
                channels,
            });
        }
    }

    /// Make sure a joining player has a record, creating one from the configured
    /// defaults the first time they are seen.
    pub fn player_joined(&self, player: PlayerId) -> Option<PlayerRecord> {
        if let Some(record) = self.preferences.get(player) {
            return Some(record);
        }
        let record = PlayerRecord::new(
            player,
            self.settings.default_sound.clone(),
            self.settings.default_display,
            self.settings.default_preference,
        );
        if !self.preferences.add(record.clone()) {
            // A concurrent join may have created it first
            return self.preferences.get(player);
        }
        log::debug!("Created preference record for {}", player);
        Some(record)
    }

    /// Periodic housekeeping: reap marked cooldowns and drop expired cache
    /// entries.
    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            cooldowns: self.cooldowns.sweep(),
            preferences: self.preferences.purge_expired(),
            ignores: self.ignores.purge_expired(),
        }
    }

    /// Let the sweeper reap the leaving player's cooldown once it lapses.
    pub fn player_quit(&self, player: PlayerId) {
        self.cooldowns.mark_for_removal(player);
    }

    pub fn set_sound(&self, player: PlayerId, sound: &str) -> bool {
        self.preferences.update_sound(player, sound)
    }

    pub fn set_display(&self, player: PlayerId, display: DisplayMode) -> bool {
        self.preferences.update_display(player, display)
    }

    pub fn set_preference(&self, player: PlayerId, preference: PreferenceMode) -> bool {
        self.preferences.update_preference(player, preference)
    }

    pub fn set_all(
        &self,
        player: PlayerId,
        sound: &str,
        display: DisplayMode,
        preference: PreferenceMode,
    ) -> bool {
        self.preferences.update_all(player, sound, display, preference)
    }

    pub fn remove_player(&self, player: PlayerId) -> bool {
        self.preferences.remove(player)
    }

    pub fn ignore(&self, player: PlayerId, other: PlayerId) -> bool {
        self.ignores.add_ignore(player, other)
    }

    pub fn unignore(&self, player: PlayerId, other: PlayerId) -> bool {
        self.ignores.remove_ignore(player, other)
    }

    pub fn is_ignored(&self, player: PlayerId, other: PlayerId) -> bool {
        self.ignores.is_ignored(player, other)
    }
}

/// Out-of-range values saturate instead of overflowing.
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
