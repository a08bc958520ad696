//! Deadlock diagnosis for blocked VM threads.
//!
//! When every active thread is blocked the run can make no further progress.
//! The detector builds a wait-for graph over threads and searches it for a
//! cycle so the report can name the threads and resources involved:
//!
//! | Status | Edge |
//! |--------|------|
//! | `WaitingMutex(m)` | waiter -> owner of `m` |
//! | `BlockedOnJoin(t)` | joiner -> `t` |
//! | `BlockedOnBarrier(b)` | waiter -> every active thread not yet at `b` |
//!
//! A thread that locks a mutex it already owns forms a cycle of length one.

use std::collections::HashSet;
use std::fmt;

use super::barrier::BarrierTable;
use super::mutex::MutexTable;
use crate::interpreter::state::{Thread, ThreadStatus};

/// Resource a thread is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    Mutex(u32),
    Join(usize),
    Barrier(u32),
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitReason::Mutex(id) => write!(f, "mutex {}", id),
            WaitReason::Join(target) => write!(f, "exit of T{}", target),
            WaitReason::Barrier(id) => write!(f, "barrier {}", id),
        }
    }
}

/// A circular wait: `threads[i]` waits on `reasons[i]`, which is held up by
/// `threads[i + 1]` (wrapping around).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockCycle {
    pub threads: Vec<usize>,
    pub reasons: Vec<WaitReason>,
}

impl fmt::Display for DeadlockCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (thread, reason) in self.threads.iter().zip(&self.reasons) {
            write!(f, "T{} waits for {} -> ", thread, reason)?;
        }
        match self.threads.first() {
            Some(first) => write!(f, "T{}", first),
            None => Ok(()),
        }
    }
}

/// Snapshot of a stalled run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockReport {
    /// Cycle in which the search found the stall, if any.
    pub cycle_detected: u64,
    /// Circular wait, if the wait-for graph has one.
    pub cycle: Option<DeadlockCycle>,
    /// Every blocked thread and what it is blocked on.
    pub blocked: Vec<(usize, ThreadStatus)>,
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deadlock at cycle {}: ", self.cycle_detected)?;
        match &self.cycle {
            Some(cycle) => write!(f, "{}", cycle)?,
            None => write!(f, "no circular wait")?,
        }
        let blocked: Vec<String> = self
            .blocked
            .iter()
            .map(|(id, status)| format!("T{}={}", id, status))
            .collect();
        write!(f, " [{}]", blocked.join(", "))
    }
}

/// Wait-for graph built from the current thread statuses.
pub struct DeadlockDetector<'a> {
    threads: &'a [Thread],
    mutexes: &'a MutexTable,
    barriers: &'a BarrierTable,
}

impl<'a> DeadlockDetector<'a> {
    pub fn new(threads: &'a [Thread], mutexes: &'a MutexTable, barriers: &'a BarrierTable) -> Self {
        Self {
            threads,
            mutexes,
            barriers,
        }
    }

    /// True when at least one thread is active and none of them can run.
    pub fn is_stalled(&self) -> bool {
        let mut active = self.threads.iter().filter(|t| t.active).peekable();
        active.peek().is_some() && active.all(|t| t.is_blocked())
    }

    /// Diagnose the stall, or `None` if some thread can still make progress.
    pub fn detect(&self, cycle_detected: u64) -> Option<DeadlockReport> {
        if !self.is_stalled() {
            return None;
        }

        let blocked = self
            .threads
            .iter()
            .filter(|t| t.is_blocked())
            .map(|t| (t.id, t.status))
            .collect();

        let cycle = self
            .threads
            .iter()
            .filter(|t| t.is_blocked())
            .find_map(|t| self.find_cycle_from(t.id));

        Some(DeadlockReport {
            cycle_detected,
            cycle,
            blocked,
        })
    }

    /// Threads that `thread` is waiting on.
    fn edges(&self, thread: usize) -> Vec<(usize, WaitReason)> {
        let Some(t) = self.threads.get(thread).filter(|t| t.is_blocked()) else {
            return Vec::new();
        };

        match t.status {
            ThreadStatus::Running => Vec::new(),
            ThreadStatus::WaitingMutex(id) => self
                .mutexes
                .owner(id)
                .map(|owner| vec![(owner, WaitReason::Mutex(id))])
                .unwrap_or_default(),
            ThreadStatus::BlockedOnJoin(target) => vec![(target, WaitReason::Join(target))],
            ThreadStatus::BlockedOnBarrier(id) => {
                let arrived = self.barriers.get(id);
                self.threads
                    .iter()
                    .filter(|other| other.active)
                    .filter(|other| !arrived.is_some_and(|b| b.contains(other.id)))
                    .map(|other| (other.id, WaitReason::Barrier(id)))
                    .collect()
            }
        }
    }

    fn find_cycle_from(&self, start: usize) -> Option<DeadlockCycle> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        let mut reasons = Vec::new();
        visited.insert(start);
        self.dfs_cycle(start, start, &mut visited, &mut path, &mut reasons)
    }

    fn dfs_cycle(
        &self,
        current: usize,
        start: usize,
        visited: &mut HashSet<usize>,
        path: &mut Vec<usize>,
        reasons: &mut Vec<WaitReason>,
    ) -> Option<DeadlockCycle> {
        path.push(current);

        for (next, reason) in self.edges(current) {
            reasons.push(reason);

            if next == start {
                return Some(DeadlockCycle {
                    threads: path.clone(),
                    reasons: reasons.clone(),
                });
            }

            if !visited.contains(&next) {
                visited.insert(next);
                if let Some(cycle) = self.dfs_cycle(next, start, visited, path, reasons) {
                    return Some(cycle);
                }
                visited.remove(&next);
            }

            reasons.pop();
        }

        path.pop();
        None
    }
}
