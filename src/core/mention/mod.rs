pub mod dispatch;
pub mod engine;

pub use dispatch::{
    Channels, CombatOracle, LogDispatcher, MentionDispatcher, MentionNotification, NeverInCombat,
    SoundCue,
};
pub use engine::{MentionEngine, MentionOutcome, SuppressReason, SweepReport};
