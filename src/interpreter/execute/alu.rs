//! Integer ALU execution unit.
//!
//! Binary operations read the destination register and a source value
//! (immediate, else source register, else EBX), compute on unbounded
//! integers and write back the low 32 bits. Flags are derived from the
//! unbounded values, so a subtraction below zero yields a negative result
//! with SF taken from bit 31 of its two's-complement form.
//!
//! # Operations
//!
//! - **Arithmetic**: add, sub, mul, div (floor, divisor 0 gives 0), inc, dec
//! - **Logic**: and, or, xor
//! - **Shift**: shl, shr (negative counts leave the value unchanged)
//! - **Move**: mov
//! - **Compare**: cmp (EAX against the immediate or EBX, ZF/SF only)
//!
//! NOT, NEG and TEST have opcode slots but no handler here; the executor
//! skips them as unsupported.

use crate::interpreter::decode::DecodedInstruction;
use crate::interpreter::state::{ExecutionContext, Gpr, Register};
use crate::interpreter::word::Operation;

use super::Outcome;

/// Shift counts beyond this produce the same truncated result.
const MAX_SHIFT: i128 = 64;

/// Integer ALU.
pub struct AluUnit;

impl AluUnit {
    /// Execute an ALU operation.
    ///
    /// Returns `None` if the operation does not belong to this unit.
    pub fn execute(instr: &DecodedInstruction, ctx: &mut ExecutionContext) -> Option<Outcome> {
        let outcome = match instr.operation {
            Operation::Mov => Self::mov(instr, ctx),

            Operation::Add
            | Operation::Sub
            | Operation::Xor
            | Operation::And
            | Operation::Or
            | Operation::Shl
            | Operation::Shr
            | Operation::Mul
            | Operation::Div => Self::binary(instr, ctx),

            Operation::Inc | Operation::Dec => Self::step(instr, ctx),

            Operation::Cmp => {
                let lhs = ctx.regs.get(Gpr::Eax) as i128;
                let rhs = match instr.immediate {
                    Some(imm) => imm as i128,
                    None => ctx.regs.get(Gpr::Ebx) as i128,
                };
                let flags = ctx.flags_mut();
                flags.zf = lhs == rhs;
                flags.sf = lhs < rhs;
                Outcome::next(0)
            }

            _ => return None,
        };
        Some(outcome)
    }

    /// Immediate, else source register, else EBX.
    #[inline]
    fn source_value(instr: &DecodedInstruction, ctx: &ExecutionContext) -> i128 {
        match instr.immediate {
            Some(imm) => imm as i128,
            None => ctx.read_or(instr.src, Gpr::Ebx) as i128,
        }
    }

    fn mov(instr: &DecodedInstruction, ctx: &mut ExecutionContext) -> Outcome {
        let Some(dest) = instr.dest else {
            return Outcome::next(0);
        };
        let value = Self::source_value(instr, ctx) as u32;
        ctx.write(dest, value);
        Outcome::next(value as i64)
    }

    fn binary(instr: &DecodedInstruction, ctx: &mut ExecutionContext) -> Outcome {
        let Some(dest) = instr.dest else {
            return Outcome::next(0);
        };
        let previous = ctx.read(dest) as i128;
        let operand = Self::source_value(instr, ctx);
        let result = Self::compute(instr.operation, previous, operand);
        Self::commit(ctx, dest, result, previous, operand)
    }

    fn step(instr: &DecodedInstruction, ctx: &mut ExecutionContext) -> Outcome {
        let Some(dest) = instr.dest else {
            return Outcome::next(0);
        };
        let previous = ctx.read(dest) as i128;
        let result = match instr.operation {
            Operation::Inc => previous + 1,
            _ => previous - 1,
        };
        Self::commit(ctx, dest, result, previous, 1)
    }

    fn commit(
        ctx: &mut ExecutionContext,
        dest: Register,
        result: i128,
        previous: i128,
        operand: i128,
    ) -> Outcome {
        let written = result as u32;
        ctx.write(dest, written);
        ctx.flags_mut().update_arith(result, previous, operand);
        Outcome::next(written as i64)
    }

    /// Unbounded result of a binary operation.
    pub fn compute(op: Operation, previous: i128, operand: i128) -> i128 {
        match op {
            Operation::Add => previous + operand,
            Operation::Sub => previous - operand,
            Operation::Xor => previous ^ operand,
            Operation::And => previous & operand,
            Operation::Or => previous | operand,
            Operation::Mul => previous * operand,
            Operation::Shl if operand >= 0 => previous << operand.min(MAX_SHIFT),
            Operation::Shr if operand >= 0 => previous >> operand.min(MAX_SHIFT),
            Operation::Div if operand != 0 => floor_div(previous, operand),
            Operation::Div => 0,
            _ => previous,
        }
    }
}

/// Division rounding toward negative infinity.
#[inline]
fn floor_div(a: i128, b: i128) -> i128 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(op: Operation) -> DecodedInstruction {
        DecodedInstruction::new(op)
    }

    fn with_dest(op: Operation, dest: Register) -> DecodedInstruction {
        DecodedInstruction {
            dest: Some(dest),
            ..instr(op)
        }
    }

    fn with_imm(op: Operation, dest: Register, imm: i32) -> DecodedInstruction {
        DecodedInstruction {
            immediate: Some(imm),
            ..with_dest(op, dest)
        }
    }

    #[test]
    fn test_add_immediate() {
        let mut ctx = ExecutionContext::new();
        ctx.write(Register::Eax, 10);

        let out = AluUnit::execute(&with_imm(Operation::Add, Register::Eax, 1), &mut ctx).unwrap();
        assert_eq!(out, Outcome::next(11));
        assert_eq!(ctx.read(Register::Eax), 11);
        assert!(!ctx.flags().zf);
        assert!(!ctx.flags().cf);
    }

    #[test]
    fn test_source_falls_back_to_ebx() {
        let mut ctx = ExecutionContext::new();
        ctx.write(Register::Ecx, 7);
        ctx.write(Register::Ebx, 3);
        AluUnit::execute(&with_dest(Operation::Sub, Register::Ecx), &mut ctx);
        assert_eq!(ctx.read(Register::Ecx), 4);

        let mut sub = with_dest(Operation::Sub, Register::Ecx);
        sub.src = Some(Register::Ecx);
        AluUnit::execute(&sub, &mut ctx);
        assert_eq!(ctx.read(Register::Ecx), 0);
        assert!(ctx.flags().zf);
    }

    #[test]
    fn test_sub_below_zero_wraps() {
        let mut ctx = ExecutionContext::new();
        ctx.write(Register::Eax, 1);
        AluUnit::execute(&with_imm(Operation::Sub, Register::Eax, 2), &mut ctx);
        assert_eq!(ctx.read(Register::Eax), 0xFFFF_FFFF);
        assert!(ctx.flags().sf);
        assert!(ctx.flags().cf);
        // Positive minus positive going negative counts as overflow
        assert!(ctx.flags().of);
    }

    #[test]
    fn test_div_floor_and_zero() {
        let mut ctx = ExecutionContext::new();
        ctx.write(Register::Eax, 7);
        AluUnit::execute(&with_imm(Operation::Div, Register::Eax, 2), &mut ctx);
        assert_eq!(ctx.read(Register::Eax), 3);

        AluUnit::execute(&with_imm(Operation::Div, Register::Eax, -2), &mut ctx);
        // floor(3 / -2) = -2
        assert_eq!(ctx.read(Register::Eax), (-2i32) as u32);

        AluUnit::execute(&with_imm(Operation::Div, Register::Eax, 0), &mut ctx);
        assert_eq!(ctx.read(Register::Eax), 0);
        assert!(ctx.flags().zf);
    }

    #[test]
    fn test_shifts() {
        let mut ctx = ExecutionContext::new();
        ctx.write(Register::Eax, 1);
        AluUnit::execute(&with_imm(Operation::Shl, Register::Eax, 4), &mut ctx);
        assert_eq!(ctx.read(Register::Eax), 16);

        AluUnit::execute(&with_imm(Operation::Shr, Register::Eax, -1), &mut ctx);
        assert_eq!(ctx.read(Register::Eax), 16);

        AluUnit::execute(&with_imm(Operation::Shl, Register::Eax, 32), &mut ctx);
        assert_eq!(ctx.read(Register::Eax), 0);
        // Unbounded result is non-zero
        assert!(!ctx.flags().zf);
    }

    #[test]
    fn test_inc_dec_aliases() {
        let mut ctx = ExecutionContext::new();
        ctx.write(Register::Eax, 0x1234_00FF);
        AluUnit::execute(&with_dest(Operation::Inc, Register::Al), &mut ctx);
        assert_eq!(ctx.read(Register::Eax), 0x1234_0000);
        // Unbounded 0x100 is not zero even though AL reads 0
        assert!(!ctx.flags().zf);

        AluUnit::execute(&with_dest(Operation::Dec, Register::Eax), &mut ctx);
        assert_eq!(ctx.read(Register::Eax), 0x1233_FFFF);
    }

    #[test]
    fn test_cmp_sets_zf_sf_only() {
        let mut ctx = ExecutionContext::new();
        ctx.write(Register::Eax, 3);
        ctx.flags_mut().cf = true;

        let mut cmp = instr(Operation::Cmp);
        cmp.immediate = Some(5);
        assert_eq!(AluUnit::execute(&cmp, &mut ctx), Some(Outcome::next(0)));
        assert!(!ctx.flags().zf);
        assert!(ctx.flags().sf);
        assert!(ctx.flags().cf);

        ctx.write(Register::Ebx, 3);
        AluUnit::execute(&instr(Operation::Cmp), &mut ctx);
        assert!(ctx.flags().zf);
        assert!(!ctx.flags().sf);
    }

    #[test]
    fn test_mov_and_missing_dest() {
        let mut ctx = ExecutionContext::new();
        let out = AluUnit::execute(&with_imm(Operation::Mov, Register::Edx, -1), &mut ctx).unwrap();
        assert_eq!(ctx.read(Register::Edx), u32::MAX);
        assert_eq!(out.result, u32::MAX as i64);

        let mut add = instr(Operation::Add);
        add.immediate = Some(4);
        assert_eq!(AluUnit::execute(&add, &mut ctx), Some(Outcome::next(0)));
    }

    #[test]
    fn test_not_an_alu_op() {
        let mut ctx = ExecutionContext::new();
        assert!(AluUnit::execute(&instr(Operation::Jmp), &mut ctx).is_none());

        ctx.write(Register::Eax, 5);
        for op in [Operation::Not, Operation::Neg, Operation::Test] {
            assert!(AluUnit::execute(&with_dest(op, Register::Eax), &mut ctx).is_none());
        }
        assert_eq!(ctx.read(Register::Eax), 5);
    }
}
