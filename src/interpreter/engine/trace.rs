//! Per-instruction trace records.

use serde::Serialize;
use std::fmt;

use crate::interpreter::decode::DecodedInstruction;
use crate::interpreter::execute::Outcome;
use crate::interpreter::state::Register;
use crate::interpreter::traits::Flags;
use crate::interpreter::word::{Operation, TypeTag};

/// Decoded operand fields of a traced instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Operands {
    pub dest: Option<Register>,
    pub src: Option<Register>,
    pub immediate: Option<i32>,
    pub type_tag: Option<TypeTag>,
}

impl From<&DecodedInstruction> for Operands {
    fn from(instr: &DecodedInstruction) -> Self {
        Self {
            dest: instr.dest,
            src: instr.src,
            immediate: instr.immediate,
            type_tag: instr.type_tag,
        }
    }
}

/// One executed instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRecord {
    pub cycle: u64,
    pub thread_id: usize,
    pub pc: i64,
    pub operation: Operation,
    pub operands: Operands,
    pub result: i64,
    /// Flags of the executing thread after the instruction.
    pub flags: Flags,
    pub next_pc: i64,
    pub halted: bool,
    pub blocked: bool,
    pub yielded: bool,
}

impl TraceRecord {
    pub fn new(
        cycle: u64,
        thread_id: usize,
        pc: i64,
        instr: &DecodedInstruction,
        outcome: &Outcome,
        flags: Flags,
    ) -> Self {
        Self {
            cycle,
            thread_id,
            pc,
            operation: instr.operation,
            operands: Operands::from(instr),
            result: outcome.result,
            flags,
            next_pc: outcome.flow.next_pc(pc),
            halted: outcome.is_halted(),
            blocked: outcome.is_blocked(),
            yielded: outcome.is_yielded(),
        }
    }

    /// The instruction as decoded.
    pub fn instruction(&self) -> DecodedInstruction {
        DecodedInstruction {
            operation: self.operation,
            dest: self.operands.dest,
            src: self.operands.src,
            immediate: self.operands.immediate,
            type_tag: self.operands.type_tag,
        }
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>5}] T{} {:>4}: {:<24} = {:<10} -> {}",
            self.cycle,
            self.thread_id,
            self.pc,
            self.instruction().to_string(),
            self.result,
            self.next_pc
        )?;

        let flags = [
            (self.flags.zf, "ZF"),
            (self.flags.sf, "SF"),
            (self.flags.cf, "CF"),
            (self.flags.of, "OF"),
        ];
        let set: Vec<&str> = flags.iter().filter(|(on, _)| *on).map(|(_, n)| *n).collect();
        if !set.is_empty() {
            write!(f, " [{}]", set.join(" "))?;
        }

        if self.halted {
            write!(f, " halted")?;
        }
        if self.blocked {
            write!(f, " blocked")?;
        }
        if self.yielded {
            write!(f, " yielded")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_outcome() {
        let instr = DecodedInstruction {
            dest: Some(Register::Eax),
            immediate: Some(1),
            ..DecodedInstruction::new(Operation::Add)
        };
        let flags = Flags {
            zf: true,
            ..Flags::default()
        };
        let record = TraceRecord::new(3, 1, 7, &instr, &Outcome::next(0), flags);

        assert_eq!(record.next_pc, 8);
        assert!(!record.halted && !record.blocked && !record.yielded);
        assert_eq!(record.instruction(), instr);

        let text = record.to_string();
        assert!(text.contains("T1"));
        assert!(text.contains("ADD EAX, 1"));
        assert!(text.ends_with("-> 8 [ZF]"));
    }

    #[test]
    fn test_blocked_and_halted_markers() {
        let instr = DecodedInstruction::new(Operation::MutexLock);
        let record = TraceRecord::new(0, 0, 2, &instr, &Outcome::blocked(), Flags::default());
        assert_eq!(record.next_pc, 2);
        assert!(record.to_string().ends_with("blocked"));

        let instr = DecodedInstruction::new(Operation::Hlt);
        let record = TraceRecord::new(0, 0, 2, &instr, &Outcome::halt(-1, 0), Flags::default());
        assert_eq!(record.next_pc, -1);
        assert!(record.halted);
    }
}
