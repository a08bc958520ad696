//! VM instance state.
//!
//! Everything a running program can observe or mutate lives in one
//! [`Machine`]: the thread list, the synchronization registry, the object
//! registries, the schema catalog and the heap collaborator. Opcode handlers
//! receive the machine by mutable reference together with the index of the
//! thread they execute for.

use crate::memory::SimulatedHeap;
use crate::object::{ObjectSystem, SchemaCatalog};

use super::state::{ExecutionContext, Thread, ThreadStatus};
use super::sync::{MutexId, SyncRegistry};
use super::traits::{Heap, NullSyscalls, SyscallHandler};

/// State of one VM instance.
pub struct Machine<H: Heap = SimulatedHeap> {
    /// All threads ever created, indexed by id.
    pub threads: Vec<Thread>,
    pub sync: SyncRegistry,
    pub objects: ObjectSystem,
    /// Class/struct schemas referenced by numeric id.
    pub catalog: SchemaCatalog,
    pub heap: H,
    pub syscalls: Box<dyn SyscallHandler>,
    /// Scheduler cycle currently executing.
    pub cycle: u64,
}

impl Default for Machine<SimulatedHeap> {
    fn default() -> Self {
        Self::new(SimulatedHeap::default())
    }
}

impl<H: Heap> Machine<H> {
    /// Machine with a single running thread at pc 0.
    pub fn new(heap: H) -> Self {
        Self {
            threads: vec![Thread::main()],
            sync: SyncRegistry::new(),
            objects: ObjectSystem::new(),
            catalog: SchemaCatalog::new(),
            heap,
            syscalls: Box::new(NullSyscalls),
            cycle: 0,
        }
    }

    pub fn with_catalog(mut self, catalog: SchemaCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_syscalls(mut self, syscalls: Box<dyn SyscallHandler>) -> Self {
        self.syscalls = syscalls;
        self
    }

    pub fn thread(&self, id: usize) -> Option<&Thread> {
        self.threads.get(id)
    }

    pub fn thread_mut(&mut self, id: usize) -> Option<&mut Thread> {
        self.threads.get_mut(id)
    }

    /// Register context of thread `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a thread of this machine.
    #[inline]
    pub fn ctx(&mut self, id: usize) -> &mut ExecutionContext {
        &mut self.threads[id].context
    }

    pub fn active_count(&self) -> usize {
        self.threads.iter().filter(|t| t.active).count()
    }

    /// Whether the scheduler may run thread `id` this cycle.
    pub fn is_schedulable(&self, id: usize) -> bool {
        self.threads.get(id).is_some_and(|t| t.is_runnable()) && !self.sync.is_waiting(id)
    }

    /// Append a thread forked from `parent` that starts at `entry`.
    pub fn spawn(&mut self, parent: usize, entry: i64) -> usize {
        let id = self.threads.len();
        let context = self.threads[parent].context.fork_child();
        self.threads.push(Thread::new(id, entry, context));
        log::debug!("T{} spawned T{} at pc {}", parent, id, entry);
        id
    }

    /// Take thread `id` out of scheduling.
    ///
    /// Joiners of the thread are woken and every mutex it owns is released,
    /// waking the first waiter of each.
    pub fn deactivate(&mut self, id: usize) {
        let Some(thread) = self.threads.get_mut(id) else {
            return;
        };
        if !thread.active {
            return;
        }
        thread.active = false;
        thread.status = ThreadStatus::Running;

        for waiter in self.sync.joins.release(id) {
            if let Some(t) = self.threads.get_mut(waiter) {
                if t.status == ThreadStatus::BlockedOnJoin(id) {
                    t.status = ThreadStatus::Running;
                    log::debug!("T{} woken: T{} exited", waiter, id);
                }
            }
        }

        for mutex in self.sync.mutexes.release_all(id) {
            log::debug!("T{} exited holding mutex {}", id, mutex);
            self.wake_mutex_waiter(mutex);
        }
        self.sync.barriers.forget(id);
    }

    /// Set the lowest-indexed thread waiting on `mutex` back to running.
    pub fn wake_mutex_waiter(&mut self, mutex: MutexId) -> Option<usize> {
        let waiter = self
            .threads
            .iter_mut()
            .find(|t| t.active && t.status == ThreadStatus::WaitingMutex(mutex))?;
        waiter.status = ThreadStatus::Running;
        log::debug!("T{} woken: mutex {} unlocked", waiter.id, mutex);
        Some(waiter.id)
    }
}
