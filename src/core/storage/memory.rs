// In-memory backend for tests: counts calls per operation, can be switched
// into a failing mode to simulate a dropped connection, and can hold a read
// open to line up races with concurrent writes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use super::StorageBackend;
use crate::core::error::{StorageError, StorageResult};
use crate::core::model::{PlayerId, PlayerRecord, RecordUpdate};

/// Holds one read between producing its result and returning it.
pub struct FetchGate {
    fetched: Barrier,
    release: Barrier,
}

impl FetchGate {
    /// Blocks until the gated read has its result in hand.
    pub fn wait_fetched(&self) {
        self.fetched.wait();
    }

    /// Lets the gated read return.
    pub fn release(&self) {
        self.release.wait();
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<PlayerId, PlayerRecord>>,
    ignores: Mutex<HashSet<(PlayerId, PlayerId)>>,
    failing: AtomicBool,
    record_reads: AtomicUsize,
    ignore_reads: AtomicUsize,
    writes: AtomicUsize,
    gate: Mutex<Option<Arc<FetchGate>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn record_reads(&self) -> usize {
        self.record_reads.load(Ordering::SeqCst)
    }

    pub fn ignore_reads(&self) -> usize {
        self.ignore_reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Gate the next record or ignore-set read.
    pub fn gate_next_fetch(&self) -> Arc<FetchGate> {
        let gate = Arc::new(FetchGate {
            fetched: Barrier::new(2),
            release: Barrier::new(2),
        });
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn pause(&self) {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.fetched.wait();
            gate.release.wait();
        }
    }

    /// Seed a row without touching the counters.
    pub fn insert_raw(&self, record: PlayerRecord) {
        self.records.lock().unwrap().insert(record.player_id, record);
    }

    /// Read a row without touching the counters.
    pub fn raw(&self, player: PlayerId) -> Option<PlayerRecord> {
        self.records.lock().unwrap().get(&player).cloned()
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection lost",
            )));
        }
        Ok(())
    }

    fn write(&self) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn try_load(&self) -> StorageResult<()> {
        self.check()
    }

    fn try_unload(&self) -> StorageResult<()> {
        Ok(())
    }

    fn try_check_schema(&self) -> StorageResult<()> {
        self.check()
    }

    fn try_add_record(&self, record: &PlayerRecord) -> StorageResult<()> {
        self.write()?;
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.player_id) {
            return Err(StorageError::Corrupt {
                column: "PlayerId",
                value: format!("duplicate {}", record.player_id),
            });
        }
        records.insert(record.player_id, record.clone());
        Ok(())
    }

    fn try_update_record(&self, player: PlayerId, update: &RecordUpdate) -> StorageResult<()> {
        self.write()?;
        if let Some(record) = self.records.lock().unwrap().get_mut(&player) {
            update.apply(record);
        }
        Ok(())
    }

    fn try_remove_record(&self, player: PlayerId) -> StorageResult<()> {
        self.write()?;
        self.records.lock().unwrap().remove(&player);
        Ok(())
    }

    fn try_fetch_record(&self, player: PlayerId) -> StorageResult<Option<PlayerRecord>> {
        self.record_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let record = self.raw(player);
        self.pause();
        Ok(record)
    }

    fn try_add_ignore(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<()> {
        self.write()?;
        self.ignores.lock().unwrap().insert((player, ignored));
        Ok(())
    }

    fn try_remove_ignore(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<()> {
        self.write()?;
        self.ignores.lock().unwrap().remove(&(player, ignored));
        Ok(())
    }

    fn try_is_ignored(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<bool> {
        self.ignore_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.ignores.lock().unwrap().contains(&(player, ignored)))
    }

    fn try_fetch_ignores(&self, player: PlayerId) -> StorageResult<HashSet<PlayerId>> {
        self.ignore_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let set: HashSet<PlayerId> = self
            .ignores
            .lock()
            .unwrap()
            .iter()
            .filter(|(owner, _)| *owner == player)
            .map(|(_, ignored)| *ignored)
            .collect();
        self.pause();
        Ok(set)
    }
}
