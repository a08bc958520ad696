//! Join wait sets: target thread to the threads waiting for it to finish.

use std::collections::BTreeMap;

use super::barrier::ThreadList;

#[derive(Debug, Clone, Default)]
pub struct JoinTable {
    waiters: BTreeMap<usize, ThreadList>,
}

impl JoinTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `waiter` as waiting for `target`.
    pub fn wait(&mut self, target: usize, waiter: usize) {
        let list = self.waiters.entry(target).or_default();
        if !list.contains(&waiter) {
            list.push(waiter);
        }
    }

    /// Remove and return everyone waiting for `target`, in wait order.
    pub fn release(&mut self, target: usize) -> ThreadList {
        self.waiters.remove(&target).unwrap_or_default()
    }

    pub fn waiters(&self, target: usize) -> &[usize] {
        self.waiters.get(&target).map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub fn is_waiting(&self, thread: usize) -> bool {
        self.waiters.values().any(|l| l.contains(&thread))
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
