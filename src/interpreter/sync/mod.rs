//! Synchronization registry.
//!
//! Mutexes, barriers and join wait sets shared by all threads of one VM.
//! Blocking is cooperative: a thread that cannot proceed records a status on
//! its `Thread` record, joins the matching wait set here, and re-executes the
//! same instruction once it is woken.
//!
//! | Table | Wait set | Woken by |
//! |-------|----------|----------|
//! | [`MutexTable`] | threads with `WaitingMutex(id)` | unlock, owner exit |
//! | [`BarrierTable`] | arrived threads per barrier | last arrival |
//! | [`JoinTable`] | joiners per target thread | target exit |

pub mod barrier;
pub mod deadlock;
pub mod join;
pub mod mutex;

pub use barrier::{BarrierArrival, BarrierId, BarrierState, BarrierStats, BarrierTable, ThreadList};
pub use deadlock::{DeadlockCycle, DeadlockDetector, DeadlockReport, WaitReason};
pub use join::JoinTable;
pub use mutex::{LockAttempt, LockStats, MutexId, MutexState, MutexTable};

/// All synchronization state of a VM.
#[derive(Debug, Clone, Default)]
pub struct SyncRegistry {
    pub mutexes: MutexTable,
    pub barriers: BarrierTable,
    pub joins: JoinTable,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `thread` sits in a barrier or join wait set.
    pub fn is_waiting(&self, thread: usize) -> bool {
        self.barriers.is_waiting(thread) || self.joins.is_waiting(thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_sets() {
        let mut sync = SyncRegistry::new();
        assert!(!sync.is_waiting(0));

        sync.joins.wait(2, 0);
        sync.barriers.arrive(1, 1, 3, 0);
        assert!(sync.is_waiting(0));
        assert!(sync.is_waiting(1));
        assert!(!sync.is_waiting(2));

        sync.joins.release(2);
        assert!(!sync.is_waiting(0));
    }
}
