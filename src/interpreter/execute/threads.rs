//! Thread and synchronization execution unit.
//!
//! | Operation | Operands | Blocks |
//! |-----------|----------|--------|
//! | THREAD_SPAWN | entry = imm, else dest/EAX | no |
//! | THREAD_JOIN | target = imm, else dest/EAX | while target is active |
//! | THREAD_EXIT | | halts |
//! | THREAD_YIELD | | no |
//! | MUTEX_CREATE | id -> dest/EAX | no |
//! | MUTEX_LOCK / MUTEX_UNLOCK | id = dest/EAX | lock while owned |
//! | BARRIER_WAIT | id = imm, else dest/EAX; target = src/ECX | until target reached |
//! | ATOMIC_ADD | addr = dest/EAX, value = src/ECX | no |
//! | ATOMIC_CMPXCHG | addr = dest/EAX, expected = EBX, new = src/ECX | no |
//!
//! A blocked thread keeps its pc and re-executes the same instruction once
//! it is woken, except at a barrier, where the releasing thread advances
//! every other participant past the barrier.

use crate::interpreter::decode::DecodedInstruction;
use crate::interpreter::machine::Machine;
use crate::interpreter::state::{Gpr, Register, ThreadStatus};
use crate::interpreter::sync::{BarrierArrival, LockAttempt};
use crate::interpreter::traits::Heap;
use crate::interpreter::word::Operation;

use super::Outcome;

/// Thread/synchronization unit.
pub struct SyncUnit;

impl SyncUnit {
    /// Execute a thread or synchronization operation for thread `tid`.
    ///
    /// Returns `None` if the operation does not belong to this unit.
    pub fn execute<H: Heap>(
        m: &mut Machine<H>,
        tid: usize,
        instr: &DecodedInstruction,
        pc: i64,
    ) -> Option<Outcome> {
        let dest = instr.dest.unwrap_or(Register::Eax);

        let outcome = match instr.operation {
            Operation::ThreadSpawn => {
                let entry = match instr.immediate {
                    Some(imm) => imm as i64,
                    None => m.ctx(tid).read(dest) as i64,
                };
                let child = m.spawn(tid, entry);
                m.ctx(tid).regs.set(Gpr::Eax, child as u32);
                Outcome::next(child as i64)
            }

            Operation::ThreadJoin => {
                let target = match instr.immediate {
                    Some(imm) => imm as i64,
                    None => m.ctx(tid).read(dest) as i64,
                };
                let live = usize::try_from(target)
                    .ok()
                    .filter(|&t| m.threads.get(t).is_some_and(|t| t.active));
                match live {
                    Some(target) => {
                        m.threads[tid].status = ThreadStatus::BlockedOnJoin(target);
                        m.sync.joins.wait(target, tid);
                        log::debug!("T{} joins T{}", tid, target);
                        Outcome::blocked()
                    }
                    None => Outcome::next(1),
                }
            }

            Operation::ThreadExit => Outcome::halt(pc, 1),

            Operation::ThreadYield => Outcome::yielded(1),

            Operation::MutexCreate => {
                let id = m.sync.mutexes.create();
                m.ctx(tid).write(dest, id);
                Outcome::next(id as i64)
            }

            Operation::MutexLock => {
                let id = m.ctx(tid).read(dest);
                match m.sync.mutexes.lock(id, tid) {
                    LockAttempt::Acquired => Outcome::next(1),
                    LockAttempt::Contended { owner } => {
                        log::debug!("T{} waits for mutex {} (owner T{})", tid, id, owner);
                        m.threads[tid].status = ThreadStatus::WaitingMutex(id);
                        Outcome::blocked()
                    }
                }
            }

            Operation::MutexUnlock => {
                let id = m.ctx(tid).read(dest);
                if m.sync.mutexes.unlock(id, tid) {
                    m.wake_mutex_waiter(id);
                    Outcome::next(1)
                } else {
                    log::debug!("T{} unlock of mutex {} it does not own", tid, id);
                    Outcome::next(0)
                }
            }

            Operation::BarrierWait => Self::barrier_wait(m, tid, instr, dest, pc),

            Operation::AtomicAdd => {
                let ctx = m.ctx(tid);
                let address = ctx.read(dest);
                let value = ctx.read_or(instr.src, Gpr::Ecx);
                let updated = m.heap.read_memory(address).wrapping_add(value);
                m.heap.write_memory(address, updated);
                Outcome::next(updated as i64)
            }

            Operation::AtomicCmpxchg => {
                let ctx = m.ctx(tid);
                let address = ctx.read(dest);
                let expected = ctx.regs.get(Gpr::Ebx);
                let new = ctx.read_or(instr.src, Gpr::Ecx);

                let current = m.heap.read_memory(address);
                let swapped = current == expected;
                if swapped {
                    m.heap.write_memory(address, new);
                }
                m.ctx(tid).flags_mut().zf = swapped;
                Outcome::next(current as i64)
            }

            _ => return None,
        };
        Some(outcome)
    }

    fn barrier_wait<H: Heap>(
        m: &mut Machine<H>,
        tid: usize,
        instr: &DecodedInstruction,
        dest: Register,
        pc: i64,
    ) -> Outcome {
        let ctx = m.ctx(tid);
        let id = match instr.immediate {
            Some(imm) => imm as u32,
            None => ctx.read(dest),
        };
        let target = ctx.read_or(instr.src, Gpr::Ecx);

        match m.sync.barriers.arrive(id, tid, target, m.cycle) {
            BarrierArrival::Released { participants } => {
                for &p in participants.iter().filter(|&&p| p != tid) {
                    if let Some(thread) = m.threads.get_mut(p) {
                        thread.status = ThreadStatus::Running;
                        thread.pc += 1;
                    }
                }
                Outcome::next(participants.len() as i64)
            }
            BarrierArrival::Waiting { arrived } => {
                log::debug!(
                    "T{} waits at barrier {} ({}/{}) pc {}",
                    tid,
                    id,
                    arrived,
                    target,
                    pc
                );
                m.threads[tid].status = ThreadStatus::BlockedOnBarrier(id);
                Outcome::blocked()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::traits::ExecuteResult;

    fn op(operation: Operation) -> DecodedInstruction {
        DecodedInstruction::new(operation)
    }

    fn imm(operation: Operation, value: i32) -> DecodedInstruction {
        DecodedInstruction {
            immediate: Some(value),
            ..op(operation)
        }
    }

    #[test]
    fn test_spawn_sets_parent_eax() {
        let mut m: Machine = Machine::default();
        m.ctx(0).write(Register::Ebx, 77);

        let out = SyncUnit::execute(&mut m, 0, &imm(Operation::ThreadSpawn, 10), 0).unwrap();
        assert_eq!(out.result, 1);
        assert_eq!(m.ctx(0).read(Register::Eax), 1);
        assert_eq!(m.threads[1].pc, 10);
        assert_eq!(m.threads[1].context.read(Register::Eax), 0);
        assert_eq!(m.threads[1].context.read(Register::Ebx), 77);
    }

    #[test]
    fn test_join_blocks_on_live_target() {
        let mut m: Machine = Machine::default();
        m.spawn(0, 0);

        let out = SyncUnit::execute(&mut m, 0, &imm(Operation::ThreadJoin, 1), 3).unwrap();
        assert_eq!(out.flow, ExecuteResult::Blocked);
        assert_eq!(m.threads[0].status, ThreadStatus::BlockedOnJoin(1));
        assert!(m.sync.joins.is_waiting(0));

        m.deactivate(1);
        assert_eq!(m.threads[0].status, ThreadStatus::Running);
        let out = SyncUnit::execute(&mut m, 0, &imm(Operation::ThreadJoin, 1), 3).unwrap();
        assert_eq!(out, Outcome::next(1));
    }

    #[test]
    fn test_join_out_of_range() {
        let mut m: Machine = Machine::default();
        assert_eq!(SyncUnit::execute(&mut m, 0, &imm(Operation::ThreadJoin, 5), 0), Some(Outcome::next(1)));
        assert_eq!(SyncUnit::execute(&mut m, 0, &imm(Operation::ThreadJoin, -1), 0), Some(Outcome::next(1)));
    }

    #[test]
    fn test_mutex_lock_contention() {
        let mut m: Machine = Machine::default();
        m.spawn(0, 0);

        let created = SyncUnit::execute(&mut m, 0, &op(Operation::MutexCreate), 0).unwrap();
        assert_eq!(created.result, 1);
        assert_eq!(m.ctx(0).read(Register::Eax), 1);
        m.ctx(1).write(Register::Eax, 1);

        assert_eq!(SyncUnit::execute(&mut m, 0, &op(Operation::MutexLock), 1), Some(Outcome::next(1)));
        let blocked = SyncUnit::execute(&mut m, 1, &op(Operation::MutexLock), 4).unwrap();
        assert_eq!(blocked.flow.next_pc(4), 4);
        assert_eq!(m.threads[1].status, ThreadStatus::WaitingMutex(1));

        // Non-owner unlock changes nothing
        assert_eq!(SyncUnit::execute(&mut m, 1, &op(Operation::MutexUnlock), 4), Some(Outcome::next(0)));
        assert_eq!(m.sync.mutexes.owner(1), Some(0));

        assert_eq!(SyncUnit::execute(&mut m, 0, &op(Operation::MutexUnlock), 2), Some(Outcome::next(1)));
        assert_eq!(m.threads[1].status, ThreadStatus::Running);
        assert_eq!(m.sync.mutexes.owner(1), None);
    }

    #[test]
    fn test_barrier_release_advances_others() {
        let mut m: Machine = Machine::default();
        m.spawn(0, 0);
        for tid in 0..2 {
            m.ctx(tid).write(Register::Ecx, 2);
            m.threads[tid].pc = 6;
        }

        let first = SyncUnit::execute(&mut m, 0, &imm(Operation::BarrierWait, 1), 6).unwrap();
        assert_eq!(first.flow, ExecuteResult::Blocked);
        assert_eq!(m.threads[0].status, ThreadStatus::BlockedOnBarrier(1));

        let last = SyncUnit::execute(&mut m, 1, &imm(Operation::BarrierWait, 1), 6).unwrap();
        assert_eq!(last, Outcome::next(2));
        assert_eq!(m.threads[0].status, ThreadStatus::Running);
        assert_eq!(m.threads[0].pc, 7);
        assert_eq!(m.threads[1].pc, 6);
        assert!(m.sync.barriers.get(1).is_none());
    }

    #[test]
    fn test_atomics() {
        let mut m: Machine = Machine::default();
        let ctx = m.ctx(0);
        ctx.write(Register::Eax, 0x2000);
        ctx.write(Register::Ecx, 5);

        assert_eq!(SyncUnit::execute(&mut m, 0, &op(Operation::AtomicAdd), 0), Some(Outcome::next(5)));
        assert_eq!(SyncUnit::execute(&mut m, 0, &op(Operation::AtomicAdd), 0), Some(Outcome::next(10)));

        m.ctx(0).write(Register::Ebx, 10);
        m.ctx(0).write(Register::Ecx, 99);
        let out = SyncUnit::execute(&mut m, 0, &op(Operation::AtomicCmpxchg), 0).unwrap();
        assert_eq!(out.result, 10);
        assert!(m.ctx(0).flags().zf);
        assert_eq!(m.heap.read_memory(0x2000), 99);

        let out = SyncUnit::execute(&mut m, 0, &op(Operation::AtomicCmpxchg), 0).unwrap();
        assert_eq!(out.result, 99);
        assert!(!m.ctx(0).flags().zf);
        assert_eq!(m.heap.read_memory(0x2000), 99);
    }

    #[test]
    fn test_exit_and_yield() {
        let mut m: Machine = Machine::default();
        let exit = SyncUnit::execute(&mut m, 0, &op(Operation::ThreadExit), 4).unwrap();
        assert_eq!(exit.flow, ExecuteResult::Halt { next_pc: 4 });
        let yielded = SyncUnit::execute(&mut m, 0, &op(Operation::ThreadYield), 4).unwrap();
        assert_eq!(yielded.flow, ExecuteResult::Yield);
        assert_eq!(yielded.flow.next_pc(4), 5);
    }
}
