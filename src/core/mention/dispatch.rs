// Notification routing and the external collaborators the engine consults.
//
// The engine decides *whether* and *through which channels* to notify; the
// dispatcher owns text formatting, localization and sound playback.

use serde::Serialize;

use crate::core::model::{DisplayMode, PlayerId};

/// Combat-state lookup, best effort current.
pub trait CombatOracle: Send + Sync {
    fn in_combat(&self, player: PlayerId) -> bool;
}

impl<F> CombatOracle for F
where
    F: Fn(PlayerId) -> bool + Send + Sync,
{
    fn in_combat(&self, player: PlayerId) -> bool {
        self(player)
    }
}

/// For hosts without a combat system.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverInCombat;

impl CombatOracle for NeverInCombat {
    fn in_combat(&self, _player: PlayerId) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundCue {
    /// Unresolved key; unknown keys fall back to the dispatcher's default sound
    pub key: String,
    pub volume: f32,
    pub pitch: f32,
}

/// Channels a single notification goes out on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channels {
    pub chat: bool,
    pub actionbar: bool,
    pub sound: Option<SoundCue>,
}

impl Channels {
    /// Channels implied by `display`; `silent` only drops the sound.
    pub fn for_display(display: DisplayMode, silent: bool, sound: SoundCue) -> Self {
        Self {
            chat: display.shows_chat(),
            actionbar: display.shows_actionbar(),
            sound: (display.plays_sound() && !silent).then_some(sound),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.chat && !self.actionbar && self.sound.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentionNotification {
    pub target: PlayerId,
    pub mentioner: PlayerId,
    pub channels: Channels,
}

pub trait MentionDispatcher: Send + Sync {
    fn dispatch(&self, notification: &MentionNotification);
}

/// Writes notifications to the log. Used by the standalone binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl MentionDispatcher for LogDispatcher {
    fn dispatch(&self, notification: &MentionNotification) {
        let channels = &notification.channels;
        log::info!(
            "mention {} -> {} (chat: {}, actionbar: {}, sound: {})",
            notification.mentioner,
            notification.target,
            channels.chat,
            channels.actionbar,
            channels
                .sound
                .as_ref()
                .map_or("none", |cue| cue.key.as_str())
        );
    }
}
