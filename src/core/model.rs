// Preference model types shared by storage, caches and the mention engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlayerId = Uuid;

/// Which channels a mention notification is delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayMode {
    #[default]
    All,
    OnlyChat,
    OnlySound,
    OnlyActionbar,
    ChatAndSound,
    ChatAndActionbar,
    ActionbarAndSound,
}

impl DisplayMode {
    /// Get all display modes
    pub fn all() -> &'static [DisplayMode] {
        &[
            Self::All,
            Self::OnlyChat,
            Self::OnlySound,
            Self::OnlyActionbar,
            Self::ChatAndSound,
            Self::ChatAndActionbar,
            Self::ActionbarAndSound,
        ]
    }

    /// Persisted name, also used in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::OnlyChat => "ONLY_CHAT",
            Self::OnlySound => "ONLY_SOUND",
            Self::OnlyActionbar => "ONLY_ACTIONBAR",
            Self::ChatAndSound => "CHAT_AND_SOUND",
            Self::ChatAndActionbar => "CHAT_AND_ACTIONBAR",
            Self::ActionbarAndSound => "ACTIONBAR_AND_SOUND",
        }
    }

    pub fn shows_chat(&self) -> bool {
        matches!(
            self,
            Self::All | Self::OnlyChat | Self::ChatAndSound | Self::ChatAndActionbar
        )
    }

    pub fn shows_actionbar(&self) -> bool {
        matches!(
            self,
            Self::All | Self::OnlyActionbar | Self::ChatAndActionbar | Self::ActionbarAndSound
        )
    }

    pub fn plays_sound(&self) -> bool {
        matches!(
            self,
            Self::All | Self::OnlySound | Self::ChatAndSound | Self::ActionbarAndSound
        )
    }
}

/// When a player wants to be notified at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreferenceMode {
    #[default]
    Always,
    /// Notify, but without sound while in combat
    SilentInCombat,
    /// Drop the notification entirely while in combat
    NeverInCombat,
    Never,
}

impl PreferenceMode {
    pub fn all() -> &'static [PreferenceMode] {
        &[
            Self::Always,
            Self::SilentInCombat,
            Self::NeverInCombat,
            Self::Never,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::SilentInCombat => "SILENT_IN_COMBAT",
            Self::NeverInCombat => "NEVER_IN_COMBAT",
            Self::Never => "NEVER",
        }
    }
}

/// Returned when a persisted or configured name matches no variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for DisplayMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "display mode",
                value: s.to_string(),
            })
    }
}

impl FromStr for PreferenceMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "preference mode",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PreferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player's mention notification settings. One per player, created on first join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    /// Not validated here; the dispatcher falls back to its default sound
    pub sound: String,
    pub display: DisplayMode,
    pub preference: PreferenceMode,
}

impl PlayerRecord {
    pub fn new(
        player_id: PlayerId,
        sound: impl Into<String>,
        display: DisplayMode,
        preference: PreferenceMode,
    ) -> Self {
        Self {
            player_id,
            sound: sound.into(),
            display,
            preference,
        }
    }
}

/// A field-level change to an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    Sound(String),
    Display(DisplayMode),
    Preference(PreferenceMode),
    All {
        sound: String,
        display: DisplayMode,
        preference: PreferenceMode,
    },
}

impl RecordUpdate {
    /// Apply the same change to an in-memory copy.
    pub fn apply(&self, record: &mut PlayerRecord) {
        match self {
            Self::Sound(sound) => record.sound = sound.clone(),
            Self::Display(display) => record.display = *display,
            Self::Preference(preference) => record.preference = *preference,
            Self::All {
                sound,
                display,
                preference,
            } => {
                record.sound = sound.clone();
                record.display = *display;
                record.preference = *preference;
            }
        }
    }

    /// Short label for log lines
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Sound(_) => "sound",
            Self::Display(_) => "display",
            Self::Preference(_) => "preference",
            Self::All { .. } => "all fields",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mode_names_round_trip() {
        for mode in DisplayMode::all() {
            assert_eq!(mode.as_str().parse::<DisplayMode>().unwrap(), *mode);
        }
        assert_eq!("only_chat".parse::<DisplayMode>().unwrap(), DisplayMode::OnlyChat);
        assert!("LOUD".parse::<DisplayMode>().is_err());
    }

    #[test]
    fn test_every_display_mode_uses_a_channel() {
        for mode in DisplayMode::all() {
            assert!(mode.shows_chat() || mode.shows_actionbar() || mode.plays_sound());
        }
        assert!(!DisplayMode::OnlyActionbar.plays_sound());
        assert!(!DisplayMode::ChatAndSound.shows_actionbar());
        assert!(!DisplayMode::ActionbarAndSound.shows_chat());
    }

    #[test]
    fn test_preference_mode_serde_matches_persisted_name() {
        let json = serde_json::to_string(&PreferenceMode::SilentInCombat).unwrap();
        assert_eq!(json, "\"SILENT_IN_COMBAT\"");
        let err = "SOMETIMES".parse::<PreferenceMode>().unwrap_err();
        assert_eq!(err.to_string(), "unknown preference mode 'SOMETIMES'");
    }

    #[test]
    fn test_update_all_rewrites_every_field() {
        let mut record = PlayerRecord::new(
            Uuid::new_v4(),
            "BLOCK_NOTE_BLOCK_PLING",
            DisplayMode::All,
            PreferenceMode::Always,
        );
        RecordUpdate::All {
            sound: "ENTITY_CAT_AMBIENT".to_string(),
            display: DisplayMode::OnlyChat,
            preference: PreferenceMode::Never,
        }
        .apply(&mut record);

        assert_eq!(record.sound, "ENTITY_CAT_AMBIENT");
        assert_eq!(record.display, DisplayMode::OnlyChat);
        assert_eq!(record.preference, PreferenceMode::Never);
    }
}
