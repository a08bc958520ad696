//! Control unit execution.
//!
//! Handles control flow and the per-thread stack:
//!
//! - **Branch**: JMP and the flag-conditional JE/JNE/JG/JL, taken only when
//!   an immediate target is present
//! - **Call/Return**: CALL pushes pc + 1; RET on an empty stack halts
//! - **Stack**: PUSH/POP share the stack with return addresses
//! - **Halt**: HLT, plus NOP

use crate::interpreter::decode::DecodedInstruction;
use crate::interpreter::state::{Gpr, Register, Thread};
use crate::interpreter::traits::Flags;
use crate::interpreter::word::Operation;

use super::Outcome;

/// Control unit for branches, calls and the stack.
pub struct ControlUnit;

impl ControlUnit {
    /// Execute a control operation.
    ///
    /// Returns `None` if the operation does not belong to this unit.
    pub fn execute(instr: &DecodedInstruction, thread: &mut Thread, pc: i64) -> Option<Outcome> {
        let outcome = match instr.operation {
            Operation::Jmp
            | Operation::Je
            | Operation::Jne
            | Operation::Jg
            | Operation::Jl => {
                let taken = Self::condition_holds(instr.operation, thread.context.flags());
                match instr.immediate {
                    Some(target) if taken => Outcome::branch(target as i64, 0),
                    _ => Outcome::next(0),
                }
            }

            Operation::Call => {
                let target = match instr.immediate {
                    Some(imm) => imm as i64,
                    None => thread.context.regs.get(Gpr::Eax) as i64,
                };
                thread.stack.push(pc + 1);
                Outcome::branch(target, 1)
            }

            Operation::Ret => match thread.stack.pop() {
                Some(target) => Outcome::branch(target, 1),
                None => {
                    log::warn!("T{} RET with empty stack at pc {}, halting", thread.id, pc);
                    Outcome::halt(pc, 0)
                }
            },

            Operation::Push => {
                let value = thread.context.read(instr.dest.unwrap_or(Register::Eax));
                thread.stack.push(value as i64);
                Outcome::next(value as i64)
            }

            Operation::Pop => match thread.stack.pop() {
                Some(value) => {
                    thread
                        .context
                        .write(instr.dest.unwrap_or(Register::Eax), value as u32);
                    Outcome::next(value)
                }
                None => Outcome::next(0),
            },

            Operation::Nop => Outcome::next(0),

            Operation::Hlt => Outcome::halt(-1, 0),

            _ => return None,
        };
        Some(outcome)
    }

    /// Branch condition for a jump opcode.
    fn condition_holds(op: Operation, flags: Flags) -> bool {
        match op {
            Operation::Je => flags.zf,
            Operation::Jne => !flags.zf,
            Operation::Jg => !flags.zf && !flags.sf,
            Operation::Jl => flags.sf,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::traits::ExecuteResult;

    fn jump(op: Operation, target: Option<i32>) -> DecodedInstruction {
        DecodedInstruction {
            immediate: target,
            ..DecodedInstruction::new(op)
        }
    }

    #[test]
    fn test_jmp_requires_immediate() {
        let mut thread = Thread::main();
        let out = ControlUnit::execute(&jump(Operation::Jmp, Some(7)), &mut thread, 2).unwrap();
        assert_eq!(out.flow.next_pc(2), 7);

        let out = ControlUnit::execute(&jump(Operation::Jmp, None), &mut thread, 2).unwrap();
        assert_eq!(out.flow.next_pc(2), 3);
    }

    #[test]
    fn test_conditional_jumps() {
        let mut thread = Thread::main();
        thread.context.flags_mut().zf = true;

        let je = ControlUnit::execute(&jump(Operation::Je, Some(9)), &mut thread, 0).unwrap();
        assert_eq!(je.flow, ExecuteResult::Branch { target: 9 });
        let jne = ControlUnit::execute(&jump(Operation::Jne, Some(9)), &mut thread, 0).unwrap();
        assert_eq!(jne.flow, ExecuteResult::Continue);
        let jg = ControlUnit::execute(&jump(Operation::Jg, Some(9)), &mut thread, 0).unwrap();
        assert_eq!(jg.flow, ExecuteResult::Continue);

        thread.context.flags_mut().zf = false;
        let jg = ControlUnit::execute(&jump(Operation::Jg, Some(9)), &mut thread, 0).unwrap();
        assert_eq!(jg.flow, ExecuteResult::Branch { target: 9 });

        thread.context.flags_mut().sf = true;
        let jl = ControlUnit::execute(&jump(Operation::Jl, Some(1)), &mut thread, 0).unwrap();
        assert_eq!(jl.flow, ExecuteResult::Branch { target: 1 });
    }

    #[test]
    fn test_call_ret() {
        let mut thread = Thread::main();
        thread.context.write(Register::Eax, 20);

        let call = ControlUnit::execute(&jump(Operation::Call, None), &mut thread, 4).unwrap();
        assert_eq!(call.flow, ExecuteResult::Branch { target: 20 });
        assert_eq!(call.result, 1);
        assert_eq!(thread.stack, vec![5]);

        let ret = ControlUnit::execute(&jump(Operation::Ret, None), &mut thread, 21).unwrap();
        assert_eq!(ret.flow, ExecuteResult::Branch { target: 5 });

        let ret = ControlUnit::execute(&jump(Operation::Ret, None), &mut thread, 5).unwrap();
        assert_eq!(ret.flow, ExecuteResult::Halt { next_pc: 5 });
        assert_eq!(ret.result, 0);
    }

    #[test]
    fn test_push_pop() {
        let mut thread = Thread::main();
        thread.context.write(Register::Ecx, 42);

        let push = DecodedInstruction {
            dest: Some(Register::Ecx),
            ..DecodedInstruction::new(Operation::Push)
        };
        assert_eq!(ControlUnit::execute(&push, &mut thread, 0).unwrap().result, 42);

        let pop = DecodedInstruction::new(Operation::Pop);
        assert_eq!(ControlUnit::execute(&pop, &mut thread, 1).unwrap().result, 42);
        assert_eq!(thread.context.read(Register::Eax), 42);

        // Empty stack: no write
        thread.context.write(Register::Eax, 1);
        assert_eq!(ControlUnit::execute(&pop, &mut thread, 2).unwrap().result, 0);
        assert_eq!(thread.context.read(Register::Eax), 1);
    }

    #[test]
    fn test_hlt() {
        let mut thread = Thread::main();
        let out = ControlUnit::execute(&DecodedInstruction::new(Operation::Hlt), &mut thread, 3).unwrap();
        assert_eq!(out.flow, ExecuteResult::Halt { next_pc: -1 });
    }
}
