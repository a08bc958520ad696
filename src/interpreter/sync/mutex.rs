//! Mutex table with per-mutex contention statistics.
//!
//! Mutexes are non-recursive: a thread locking a mutex it already owns
//! blocks on itself. Ids start at 1; locking an id that was never created
//! registers it on the spot. Once every id up to `u32::MAX` is taken,
//! creation returns 0.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Mutex identifier.
pub type MutexId = u32;

/// Statistics for a single mutex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockStats {
    /// Number of successful locks.
    pub acquires: u64,
    /// Number of successful unlocks.
    pub releases: u64,
    /// Lock attempts that found the mutex owned.
    pub contention_count: u64,
    /// Unlock attempts by a thread that was not the owner.
    pub failed_unlocks: u64,
}

impl LockStats {
    fn merge(&mut self, other: &LockStats) {
        self.acquires += other.acquires;
        self.releases += other.releases;
        self.contention_count += other.contention_count;
        self.failed_unlocks += other.failed_unlocks;
    }
}

/// State of one mutex.
#[derive(Debug, Clone, Default)]
pub struct MutexState {
    /// Owning thread, if locked.
    pub owner: Option<usize>,
    pub stats: LockStats,
}

/// Outcome of a lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// Caller now owns the mutex.
    Acquired,
    /// Mutex is held by `owner`.
    Contended { owner: usize },
}

/// All mutexes of a VM.
#[derive(Debug, Clone)]
pub struct MutexTable {
    mutexes: BTreeMap<MutexId, MutexState>,
    /// Wider than `MutexId` so the id after `u32::MAX` is representable.
    next_id: u64,
}

impl Default for MutexTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MutexTable {
    pub fn new() -> Self {
        Self {
            mutexes: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Create an unowned mutex and return its id, or 0 if no id is left.
    ///
    /// Ids already registered by an implicit lock are skipped.
    pub fn create(&mut self) -> MutexId {
        while let Ok(id) = MutexId::try_from(self.next_id) {
            self.next_id += 1;
            if let Entry::Vacant(entry) = self.mutexes.entry(id) {
                entry.insert(MutexState::default());
                return id;
            }
        }
        log::warn!("mutex ids exhausted, MUTEX_CREATE returns 0");
        0
    }

    /// Try to lock `id` for `thread`.
    pub fn lock(&mut self, id: MutexId, thread: usize) -> LockAttempt {
        if !self.mutexes.contains_key(&id) {
            log::debug!("mutex {} locked before creation, registering it", id);
            self.next_id = self.next_id.max(u64::from(id) + 1);
        }
        let state = self.mutexes.entry(id).or_default();

        match state.owner {
            None => {
                state.owner = Some(thread);
                state.stats.acquires += 1;
                LockAttempt::Acquired
            }
            Some(owner) => {
                state.stats.contention_count += 1;
                LockAttempt::Contended { owner }
            }
        }
    }

    /// Unlock `id` if `thread` owns it. Returns `false` (and leaves ownership
    /// unchanged) otherwise.
    pub fn unlock(&mut self, id: MutexId, thread: usize) -> bool {
        let Some(state) = self.mutexes.get_mut(&id) else {
            return false;
        };
        if state.owner == Some(thread) {
            state.owner = None;
            state.stats.releases += 1;
            true
        } else {
            state.stats.failed_unlocks += 1;
            false
        }
    }

    pub fn owner(&self, id: MutexId) -> Option<usize> {
        self.mutexes.get(&id).and_then(|m| m.owner)
    }

    /// Unlock every mutex owned by `thread`, returning their ids.
    pub fn release_all(&mut self, thread: usize) -> Vec<MutexId> {
        let mut released = Vec::new();
        for (id, state) in self.mutexes.iter_mut() {
            if state.owner == Some(thread) {
                state.owner = None;
                state.stats.releases += 1;
                released.push(*id);
            }
        }
        released
    }

    pub fn get(&self, id: MutexId) -> Option<&MutexState> {
        self.mutexes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MutexId, &MutexState)> {
        self.mutexes.iter().map(|(id, state)| (*id, state))
    }

    pub fn len(&self) -> usize {
        self.mutexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutexes.is_empty()
    }

    /// Statistics summed over all mutexes.
    pub fn aggregate_stats(&self) -> LockStats {
        let mut total = LockStats::default();
        for state in self.mutexes.values() {
            total.merge(&state.stats);
        }
        total
    }
}
