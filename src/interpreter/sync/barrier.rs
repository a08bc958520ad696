//! Barrier tracking.
//!
//! A barrier is created by the first thread that waits on it and released
//! once the number of arrived threads reaches the target supplied by the
//! arriving thread. Releasing deletes the barrier, so the same id can be
//! reused for the next phase.
//!
//! # Usage
//!
//! ```
//! use neural_vm::interpreter::sync::{BarrierArrival, BarrierTable};
//!
//! let mut barriers = BarrierTable::new();
//! assert_eq!(barriers.arrive(1, 0, 2, 10), BarrierArrival::Waiting { arrived: 1 });
//!
//! match barriers.arrive(1, 1, 2, 14) {
//!     BarrierArrival::Released { participants } => assert_eq!(participants.as_slice(), &[0, 1]),
//!     other => panic!("unexpected {:?}", other),
//! }
//! assert!(barriers.get(1).is_none());
//! ```

use std::collections::BTreeMap;

use smallvec::SmallVec;

/// Barrier identifier.
pub type BarrierId = u32;

/// Thread list sized for the common small-barrier case.
pub type ThreadList = SmallVec<[usize; 4]>;

/// State of one pending barrier.
#[derive(Debug, Clone)]
pub struct BarrierState {
    /// Threads that have arrived, in arrival order.
    arrived: ThreadList,
    /// Cycle of the first arrival.
    first_arrival: u64,
}

impl BarrierState {
    fn new(first_arrival: u64) -> Self {
        Self {
            arrived: SmallVec::new(),
            first_arrival,
        }
    }

    pub fn arrived(&self) -> &[usize] {
        &self.arrived
    }

    pub fn first_arrival(&self) -> u64 {
        self.first_arrival
    }

    pub fn contains(&self, thread: usize) -> bool {
        self.arrived.contains(&thread)
    }
}

/// Result of arriving at a barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierArrival {
    /// Not enough threads yet; the caller must wait.
    Waiting { arrived: usize },
    /// Target reached; all participants (caller included) are released.
    Released { participants: ThreadList },
}

/// Aggregate barrier statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarrierStats {
    /// Number of barrier releases.
    pub completions: u64,
    /// Sum over releases of cycles between first and last arrival.
    pub total_wait_cycles: u64,
    /// Longest such span.
    pub max_wait_cycles: u64,
}

/// All pending barriers.
#[derive(Debug, Clone, Default)]
pub struct BarrierTable {
    barriers: BTreeMap<BarrierId, BarrierState>,
    stats: BarrierStats,
}

impl BarrierTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `thread` arriving at barrier `id` during `cycle`.
    ///
    /// The barrier releases once the arrived count is at least `target`.
    pub fn arrive(&mut self, id: BarrierId, thread: usize, target: u32, cycle: u64) -> BarrierArrival {
        let state = self
            .barriers
            .entry(id)
            .or_insert_with(|| BarrierState::new(cycle));
        if !state.arrived.contains(&thread) {
            state.arrived.push(thread);
        }

        let arrived = state.arrived.len();
        if arrived < target as usize {
            return BarrierArrival::Waiting { arrived };
        }

        let first_arrival = state.first_arrival;
        let participants = self
            .barriers
            .remove(&id)
            .map(|s| s.arrived)
            .unwrap_or_default();

        let waited = cycle.saturating_sub(first_arrival);
        self.stats.completions += 1;
        self.stats.total_wait_cycles += waited;
        self.stats.max_wait_cycles = self.stats.max_wait_cycles.max(waited);

        log::debug!(
            "barrier {} released {} threads after {} cycles",
            id,
            participants.len(),
            waited
        );
        BarrierArrival::Released { participants }
    }

    pub fn get(&self, id: BarrierId) -> Option<&BarrierState> {
        self.barriers.get(&id)
    }

    /// Whether `thread` is waiting at any barrier.
    pub fn is_waiting(&self, thread: usize) -> bool {
        self.barriers.values().any(|b| b.contains(thread))
    }

    /// Drop `thread` from every pending barrier.
    pub fn forget(&mut self, thread: usize) {
        for state in self.barriers.values_mut() {
            state.arrived.retain(|t| *t != thread);
        }
        self.barriers.retain(|_, state| !state.arrived.is_empty());
    }

    pub fn iter(&self) -> impl Iterator<Item = (BarrierId, &BarrierState)> {
        self.barriers.iter().map(|(id, state)| (*id, state))
    }

    pub fn pending(&self) -> usize {
        self.barriers.len()
    }

    pub fn stats(&self) -> BarrierStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_on_target() {
        let mut table = BarrierTable::new();
        assert_eq!(table.arrive(3, 0, 3, 0), BarrierArrival::Waiting { arrived: 1 });
        assert_eq!(table.arrive(3, 2, 3, 1), BarrierArrival::Waiting { arrived: 2 });
        assert!(table.is_waiting(0));
        assert!(!table.is_waiting(1));

        let BarrierArrival::Released { participants } = table.arrive(3, 1, 3, 5) else {
            panic!("barrier should release");
        };
        assert_eq!(participants.as_slice(), &[0, 2, 1]);
        assert_eq!(table.pending(), 0);
        assert!(!table.is_waiting(0));

        let stats = table.stats();
        assert_eq!(stats.completions, 1);
        assert_eq!(stats.max_wait_cycles, 5);
    }

    #[test]
    fn test_target_of_one_releases_immediately() {
        let mut table = BarrierTable::new();
        let arrival = table.arrive(1, 4, 1, 0);
        assert!(matches!(arrival, BarrierArrival::Released { ref participants } if participants.as_slice() == [4]));
    }

    #[test]
    fn test_id_reusable_after_release() {
        let mut table = BarrierTable::new();
        table.arrive(1, 0, 2, 0);
        table.arrive(1, 1, 2, 0);
        assert_eq!(table.arrive(1, 0, 2, 9), BarrierArrival::Waiting { arrived: 1 });
        assert_eq!(table.get(1).unwrap().first_arrival(), 9);
        assert_eq!(table.stats().completions, 1);
    }

    #[test]
    fn test_forget_drops_empty_barrier() {
        let mut table = BarrierTable::new();
        table.arrive(1, 0, 2, 0);
        table.arrive(2, 0, 3, 0);
        table.arrive(2, 1, 3, 0);
        table.forget(0);
        assert!(table.get(1).is_none());
        assert_eq!(table.get(2).unwrap().arrived(), &[1]);
    }
}
