//! Instruction word encoding.
//!
//! `WordBuilder` is the inverse of the decoder: it drives the slots that
//! select an operation and its operands. Immediates found in the literal
//! table use their literal slot; everything else goes through the
//! large-immediate flag and bitfield.
//!
//! Type tags are written at [`TYPE_TAG_LEVEL`] instead of 1.0 because the
//! type range shares indices with FN_DEFINE..MEM_LOAD and SYSCALL: a full
//! strength tag at, say, 128 (`int`) would tie with the real opcode and the
//! earlier table entry (FN_DEFINE) would win the operation argmax.

use super::layout::{self, IMM_BITS_START, IMM_LARGE_FLAG};
use super::{InstructionWord, Operation, TypeTag};
use crate::interpreter::state::Register;

/// Activation used for opcode, register and immediate slots.
pub const SELECT_LEVEL: f64 = 1.0;

/// Activation used for type-tag slots.
pub const TYPE_TAG_LEVEL: f64 = 0.9;

/// Builder for one instruction word.
#[derive(Debug, Clone)]
pub struct WordBuilder {
    op: Operation,
    dest: Option<Register>,
    src: Option<Register>,
    imm: Option<i32>,
    type_tag: Option<TypeTag>,
}

impl WordBuilder {
    pub fn new(op: Operation) -> Self {
        Self {
            op,
            dest: None,
            src: None,
            imm: None,
            type_tag: None,
        }
    }

    pub fn dest(mut self, reg: Register) -> Self {
        self.dest = Some(reg);
        self
    }

    pub fn src(mut self, reg: Register) -> Self {
        self.src = Some(reg);
        self
    }

    pub fn imm(mut self, value: i32) -> Self {
        self.imm = Some(value);
        self
    }

    pub fn type_tag(mut self, tag: TypeTag) -> Self {
        self.type_tag = Some(tag);
        self
    }

    /// Encode the word.
    ///
    /// Registers that have no slot in their range (e.g. EIP as destination,
    /// AX as source) are left unencoded and decode as absent.
    pub fn build(&self) -> InstructionWord {
        let mut word = InstructionWord::zeroed();

        if let Some(index) = layout::opcode_index(self.op) {
            word.set(index, SELECT_LEVEL);
        }

        if let Some(index) = self.dest.and_then(layout::dest_index) {
            word.set(index, SELECT_LEVEL);
        }

        if let Some(index) = self.src.and_then(layout::src_index) {
            word.set(index, SELECT_LEVEL);
        }

        if let Some(value) = self.imm {
            match layout::small_immediate_index(value) {
                Some(index) => word.set(index, SELECT_LEVEL),
                None => {
                    word.set(IMM_LARGE_FLAG, SELECT_LEVEL);
                    let bits = value as u32;
                    for bit in 0..32 {
                        if bits & (1 << bit) != 0 {
                            word.set(IMM_BITS_START + bit, SELECT_LEVEL);
                        }
                    }
                }
            }
        }

        if let Some(index) = self.type_tag.and_then(layout::type_index) {
            word.set(index, TYPE_TAG_LEVEL);
        }

        word
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_immediate_uses_literal_slot() {
        let word = WordBuilder::new(Operation::Mov).dest(Register::Ecx).imm(-8).build();
        assert_eq!(word.get(0), 1.0);
        assert_eq!(word.get(73), 1.0);
        assert_eq!(word.get(117), 1.0);
        assert_eq!(word.get(IMM_LARGE_FLAG), 0.0);
    }

    #[test]
    fn test_large_immediate_sets_bitfield() {
        let word = WordBuilder::new(Operation::Jmp).imm(5).build();
        assert_eq!(word.get(IMM_LARGE_FLAG), 1.0);
        assert_eq!(word.get(IMM_BITS_START), 1.0);
        assert_eq!(word.get(IMM_BITS_START + 1), 0.0);
        assert_eq!(word.get(IMM_BITS_START + 2), 1.0);
    }

    #[test]
    fn test_type_tag_below_opcode_level() {
        let word = WordBuilder::new(Operation::HeapAlloc).type_tag(TypeTag::Int).build();
        assert_eq!(word.get(360), SELECT_LEVEL);
        assert_eq!(word.get(128), TYPE_TAG_LEVEL);
    }

    #[test]
    fn test_unencodable_register_is_dropped() {
        let word = WordBuilder::new(Operation::Mov).dest(Register::Eip).src(Register::Ax).build();
        let selected: Vec<usize> = (0..word.len()).filter(|i| word.get(*i) > 0.0).collect();
        assert_eq!(selected, vec![0]);
    }
}
