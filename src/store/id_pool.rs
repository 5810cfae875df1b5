//! Reusable-ID pool.
//!
//! Entry ids are small integers that users type in chat commands, so
//! tombstoned ids get recycled instead of growing forever. Allocation is
//! serialized through one mutex; two concurrent submissions can never
//! receive the same id.

use parking_lot::Mutex;
use std::collections::BTreeSet;

use super::{CaveStore, StoreResult, SubmissionStatus};

#[derive(Debug, Default)]
struct PoolState {
    free: BTreeSet<u32>,
    next: u32,
}

/// Process-wide allocator of submission ids.
#[derive(Debug)]
pub struct IdPool {
    state: Mutex<PoolState>,
}

impl IdPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState { free: BTreeSet::new(), next: 1 }),
        }
    }

    /// Seed the pool from the store: the counter continues past the
    /// highest live id, stale `Preload` rows left by a crash are
    /// tombstoned, and all `Delete` rows are harvested immediately.
    pub fn bootstrap(store: &dyn CaveStore) -> StoreResult<Self> {
        let pool = Self::new();
        {
            let mut state = pool.state.lock();
            let mut max_id = 0;
            for status in [
                SubmissionStatus::Active,
                SubmissionStatus::Pending,
                SubmissionStatus::Preload,
                SubmissionStatus::Delete,
            ] {
                for sub in store.submissions_by_status(status)? {
                    max_id = max_id.max(sub.id);
                }
            }
            state.next = max_id + 1;
        }
        for stale in store.submissions_by_status(SubmissionStatus::Preload)? {
            log::warn!("sweeping stale preload submission {}", stale.id);
            let mut dead = stale;
            dead.status = SubmissionStatus::Delete;
            store.upsert_submission(&dead)?;
        }
        pool.sweep(store)?;
        Ok(pool)
    }

    /// Hand out the smallest recycled id, or the next fresh one.
    pub fn allocate(&self) -> u32 {
        let mut state = self.state.lock();
        if let Some(&id) = state.free.iter().next() {
            state.free.remove(&id);
            return id;
        }
        let id = state.next;
        state.next += 1;
        id
    }

    /// Return an id to the pool without touching the store.
    pub fn release(&self, id: u32) {
        self.state.lock().free.insert(id);
    }

    /// Harvest every `Delete` row: drop the row plus any hash/meta rows
    /// still referencing it, and free the id. Returns how many ids were
    /// recycled.
    pub fn sweep(&self, store: &dyn CaveStore) -> StoreResult<usize> {
        let dead = store.submissions_by_status(SubmissionStatus::Delete)?;
        let mut harvested = 0;
        for sub in dead {
            store.remove_hashes(sub.id)?;
            store.remove_meta(sub.id)?;
            store.remove_submission(sub.id)?;
            self.release(sub.id);
            harvested += 1;
        }
        if harvested > 0 {
            log::debug!("recycled {harvested} submission ids");
        }
        Ok(harvested)
    }
}

impl Default for IdPool {
    fn default() -> Self {
        Self::new()
    }
}
