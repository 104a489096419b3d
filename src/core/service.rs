// Async front door for hosts running on tokio.
//
// Engine calls may block on storage, so they run on the blocking pool. A
// semaphore caps how many run at once, which keeps a burst of mentions from
// exhausting the connection pool.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::mention::MentionEngine;
use super::model::{PlayerId, PlayerRecord};

#[derive(Clone)]
pub struct MentionService {
    engine: Arc<MentionEngine>,
    permits: Arc<Semaphore>,
}

impl MentionService {
    pub fn new(engine: Arc<MentionEngine>, workers: usize) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn engine(&self) -> &Arc<MentionEngine> {
        &self.engine
    }

    pub async fn mention_player(&self, target: PlayerId, mentioner: PlayerId) -> bool {
        self.run_blocking("mention", move |engine| {
            engine.mention_player(target, mentioner)
        })
        .await
        .unwrap_or(false)
    }

    pub async fn player_joined(&self, player: PlayerId) -> Option<PlayerRecord> {
        self.run_blocking("join", move |engine| engine.player_joined(player))
            .await
            .flatten()
    }

    pub async fn player_quit(&self, player: PlayerId) {
        // In memory only, no need for the blocking pool
        self.engine.player_quit(player);
    }

    async fn run_blocking<T, F>(&self, what: &str, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&MentionEngine) -> T + Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                log::error!("Storage worker pool closed during {}: {}", what, e);
                return None;
            }
        };
        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(&engine)
        })
        .await;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("Blocking {} task failed: {}", what, e);
                None
            }
        }
    }
}
