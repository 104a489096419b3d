// Periodic housekeeping: reaps marked cooldown entries and expired cache
// entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::mention::MentionEngine;

/// Sweep `engine` every `period` until `shutdown` flips to true or its sender
/// is dropped.
pub fn spawn_sweeper(
    engine: Arc<MentionEngine>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = engine.sweep();
                    if report.total() > 0 {
                        log::debug!(
                            "Swept {} cooldowns, {} preference and {} ignore cache entries",
                            report.cooldowns,
                            report.preferences,
                            report.ignores
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::debug!("Sweeper stopped");
    })
}
