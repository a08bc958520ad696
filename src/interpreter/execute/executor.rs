//! Opcode dispatcher.
//!
//! The `Executor` offers one decoded instruction to each execution unit in
//! turn. Operations no unit claims are either placeholders that report
//! success (result 1) or unsupported operations that are logged and skipped
//! (result 0). Neither ever stops the thread.

use crate::interpreter::decode::DecodedInstruction;
use crate::interpreter::machine::Machine;
use crate::interpreter::traits::Heap;

use super::alu::AluUnit;
use super::control::ControlUnit;
use super::memory::MemoryUnit;
use super::object::ObjectUnit;
use super::threads::SyncUnit;
use super::Outcome;

/// Counters kept across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Instructions executed (blocked attempts included).
    pub executed: u64,
    /// Attempts that blocked the thread.
    pub blocked: u64,
    /// Placeholder operations that reported success without effect.
    pub not_implemented: u64,
    /// Operations skipped as unsupported.
    pub unsupported: u64,
}

/// Dispatches decoded instructions to the execution units.
#[derive(Debug, Default)]
pub struct Executor {
    stats: ExecutorStats,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute `instr` at `pc` for thread `tid`.
    pub fn execute<H: Heap>(
        &mut self,
        m: &mut Machine<H>,
        tid: usize,
        instr: &DecodedInstruction,
        pc: i64,
    ) -> Outcome {
        self.stats.executed += 1;
        let outcome = self.dispatch(m, tid, instr, pc);
        if outcome.is_blocked() {
            self.stats.blocked += 1;
        }
        outcome
    }

    fn dispatch<H: Heap>(
        &mut self,
        m: &mut Machine<H>,
        tid: usize,
        instr: &DecodedInstruction,
        pc: i64,
    ) -> Outcome {
        // Try each execution unit in order
        let thread = &mut m.threads[tid];
        if let Some(outcome) = AluUnit::execute(instr, &mut thread.context) {
            return outcome;
        }
        if let Some(outcome) = ControlUnit::execute(instr, thread, pc) {
            return outcome;
        }
        if let Some(outcome) = SyncUnit::execute(m, tid, instr, pc) {
            return outcome;
        }
        if let Some(outcome) = MemoryUnit::execute(m, tid, instr) {
            return outcome;
        }
        if let Some(outcome) = ObjectUnit::execute(m, tid, instr) {
            return outcome;
        }

        if instr.operation.is_stub() {
            log::debug!("{} at pc {} is not implemented, reporting success", instr.operation, pc);
            self.stats.not_implemented += 1;
            return Outcome::next(1);
        }

        log::warn!("T{}: {} at pc {} not supported, skipping", tid, instr.operation, pc);
        self.stats.unsupported += 1;
        Outcome::next(0)
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::state::Register;
    use crate::interpreter::traits::ExecuteResult;
    use crate::interpreter::word::Operation;

    fn exec(executor: &mut Executor, m: &mut Machine, op: Operation) -> Outcome {
        executor.execute(m, 0, &DecodedInstruction::new(op), 5)
    }

    #[test]
    fn test_stubs_report_success() {
        let mut executor = Executor::new();
        let mut m: Machine = Machine::default();
        for op in [
            Operation::HeapRealloc,
            Operation::HeapClear,
            Operation::MemPool,
            Operation::UnionDefine,
            Operation::UnionAccess,
            Operation::PtrArith,
            Operation::RefCreate,
            Operation::RefDeref,
            Operation::MethodCall,
        ] {
            assert_eq!(exec(&mut executor, &mut m, op), Outcome::next(1), "{}", op);
        }
        assert_eq!(executor.stats().not_implemented, 9);
    }

    #[test]
    fn test_unsupported_is_skipped() {
        let mut executor = Executor::new();
        let mut m: Machine = Machine::default();
        for op in [
            Operation::Int,
            Operation::Not,
            Operation::Neg,
            Operation::Test,
            Operation::FnDefine,
            Operation::FnCall,
            Operation::FnRet,
            Operation::MemAlloc,
            Operation::MemIndex,
            Operation::Unknown,
        ] {
            let outcome = exec(&mut executor, &mut m, op);
            assert_eq!(outcome.result, 0);
            assert_eq!(outcome.flow.next_pc(5), 6);
        }
        assert_eq!(executor.stats().unsupported, 10);
        assert_eq!(executor.stats().executed, 10);
    }

    #[test]
    fn test_unsupported_leaves_state_alone() {
        let mut executor = Executor::new();
        let mut m: Machine = Machine::default();
        m.ctx(0).write(Register::Eax, 5);
        m.ctx(0).flags_mut().cf = true;
        let before = m.ctx(0).flags();

        for op in [Operation::Neg, Operation::Not, Operation::Test] {
            let instr = DecodedInstruction {
                dest: Some(Register::Eax),
                immediate: Some(3),
                ..DecodedInstruction::new(op)
            };
            assert_eq!(executor.execute(&mut m, 0, &instr, 1), Outcome::next(0));
        }
        assert_eq!(m.ctx(0).read(Register::Eax), 5);
        assert_eq!(m.ctx(0).flags(), before);
    }

    #[test]
    fn test_routes_to_units() {
        let mut executor = Executor::new();
        let mut m: Machine = Machine::default();

        let add = DecodedInstruction {
            dest: Some(Register::Ecx),
            immediate: Some(8),
            ..DecodedInstruction::new(Operation::Add)
        };
        assert_eq!(executor.execute(&mut m, 0, &add, 0), Outcome::next(8));

        let hlt = exec(&mut executor, &mut m, Operation::Hlt);
        assert_eq!(hlt.flow, ExecuteResult::Halt { next_pc: -1 });

        let created = exec(&mut executor, &mut m, Operation::MutexCreate);
        assert_eq!(created.result, 1);
        m.spawn(0, 0);
        m.ctx(1).write(Register::Eax, 1);
        exec(&mut executor, &mut m, Operation::MutexLock);
        let blocked = executor.execute(&mut m, 1, &DecodedInstruction::new(Operation::MutexLock), 2);
        assert!(blocked.is_blocked());
        assert_eq!(executor.stats().blocked, 1);
    }
}
