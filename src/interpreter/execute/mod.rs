//! Execution units for VM operations.
//!
//! Each unit handles one category of operations and returns `None` for
//! anything outside it, so the [`Executor`] can offer an instruction to the
//! units in order:
//!
//! | Unit | Operations |
//! |------|------------|
//! | [`AluUnit`] | MOV, arithmetic, logic, shifts, CMP/TEST |
//! | [`ControlUnit`] | jumps, CALL/RET, PUSH/POP, NOP, HLT |
//! | [`SyncUnit`] | threads, mutexes, barriers, atomics |
//! | [`MemoryUnit`] | loads/stores, heap/string/array allocation, SYSCALL |
//! | [`ObjectUnit`] | classes, structs, pointers |
//!
//! # Example
//!
//! ```
//! use neural_vm::interpreter::decode::DecodedInstruction;
//! use neural_vm::interpreter::execute::Executor;
//! use neural_vm::interpreter::machine::Machine;
//! use neural_vm::interpreter::word::Operation;
//!
//! let mut machine: Machine = Machine::default();
//! let mut executor = Executor::new();
//! let outcome = executor.execute(&mut machine, 0, &DecodedInstruction::new(Operation::Nop), 0);
//! assert_eq!(outcome.flow.next_pc(0), 1);
//! ```

mod alu;
mod control;
mod executor;
mod memory;
mod object;
mod threads;

pub use alu::AluUnit;
pub use control::ControlUnit;
pub use executor::{Executor, ExecutorStats};
pub use memory::{MemoryUnit, HEAP_ALLOC_ALIGNMENT};
pub use object::{ObjectUnit, STRUCT_ALIGNMENT};
pub use threads::SyncUnit;

use super::traits::ExecuteResult;

/// Result value and control flow of one executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Value reported in the trace.
    pub result: i64,
    pub flow: ExecuteResult,
}

impl Outcome {
    /// Continue at pc + 1.
    #[inline]
    pub fn next(result: i64) -> Self {
        Self {
            result,
            flow: ExecuteResult::Continue,
        }
    }

    #[inline]
    pub fn branch(target: i64, result: i64) -> Self {
        Self {
            result,
            flow: ExecuteResult::Branch { target },
        }
    }

    /// Retry the same instruction once woken.
    #[inline]
    pub fn blocked() -> Self {
        Self {
            result: 0,
            flow: ExecuteResult::Blocked,
        }
    }

    #[inline]
    pub fn yielded(result: i64) -> Self {
        Self {
            result,
            flow: ExecuteResult::Yield,
        }
    }

    #[inline]
    pub fn halt(next_pc: i64, result: i64) -> Self {
        Self {
            result,
            flow: ExecuteResult::Halt { next_pc },
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.flow == ExecuteResult::Blocked
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.flow, ExecuteResult::Halt { .. })
    }

    pub fn is_yielded(&self) -> bool {
        self.flow == ExecuteResult::Yield
    }
}
