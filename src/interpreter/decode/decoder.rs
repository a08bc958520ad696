//! One-hot instruction word decoder.
//!
//! Each field is decoded independently:
//!
//! 1. Find the strongest slot in the field's range (first one on ties)
//! 2. If it clears the threshold, map its offset through the field's table
//! 3. Offsets without a table entry decode as `None`
//!
//! NaN slots read as 0.0 everywhere (see [`InstructionWord::activation`]).
//!
//! The immediate has two extra encodings tried in order when no literal slot
//! is selected: a 32-bit two's-complement bitfield guarded by a flag slot,
//! and a raw value slot that is truncated toward zero.

use super::DecodedInstruction;
use crate::interpreter::state::Register;
use crate::interpreter::traits::Decoder;
use crate::interpreter::word::layout::{
    DEST_RANGE, DEST_REGISTERS, IMM_BITS_START, IMM_FALLBACK, IMM_FALLBACK_EPSILON,
    IMM_LARGE_FLAG, IMM_RANGE, OPCODE_TABLE, SMALL_IMMEDIATES, SRC_RANGE, SRC_REGISTERS,
    THRESHOLD, TYPE_RANGE, TYPE_TAGS,
};
use crate::interpreter::word::{InstructionWord, Operation, TypeTag};
use std::ops::Range;

/// Stateless decoder for one-hot instruction words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordDecoder;

impl WordDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Select the operation with the strongest opcode slot.
    pub fn decode_operation(word: &InstructionWord) -> Operation {
        let mut best: Option<(Operation, f64)> = None;
        for (index, op) in OPCODE_TABLE {
            let value = word.activation(index);
            match best {
                Some((_, max)) if !(value > max) => {}
                _ => best = Some((op, value)),
            }
        }

        match best {
            Some((op, max)) if max >= THRESHOLD => op,
            _ => Operation::Unknown,
        }
    }

    /// Offset of the selected slot in `range`, if any clears the threshold.
    fn selected_offset(word: &InstructionWord, range: Range<usize>) -> Option<usize> {
        let start = range.start;
        let (index, max) = word.argmax(range)?;
        (max >= THRESHOLD).then_some(index - start)
    }

    pub fn decode_dest(word: &InstructionWord) -> Option<Register> {
        Self::selected_offset(word, DEST_RANGE).and_then(|offset| DEST_REGISTERS.get(offset).copied())
    }

    pub fn decode_src(word: &InstructionWord) -> Option<Register> {
        Self::selected_offset(word, SRC_RANGE).and_then(|offset| SRC_REGISTERS.get(offset).copied())
    }

    pub fn decode_type_tag(word: &InstructionWord) -> Option<TypeTag> {
        Self::selected_offset(word, TYPE_RANGE).and_then(|offset| TYPE_TAGS.get(offset).copied())
    }

    pub fn decode_immediate(word: &InstructionWord) -> Option<i32> {
        if let Some(offset) = Self::selected_offset(word, IMM_RANGE) {
            return SMALL_IMMEDIATES.get(offset).copied();
        }

        if word.activation(IMM_LARGE_FLAG) >= THRESHOLD {
            let bits = (0..32)
                .filter(|bit| word.activation(IMM_BITS_START + bit) >= THRESHOLD)
                .fold(0u32, |acc, bit| acc | (1 << bit));
            return Some(bits as i32);
        }

        let raw = word.activation(IMM_FALLBACK);
        if raw.abs() > IMM_FALLBACK_EPSILON {
            // `as` truncates toward zero and saturates at the i32 bounds
            return Some(raw as i32);
        }

        None
    }
}

impl Decoder for WordDecoder {
    fn decode(&self, word: &InstructionWord) -> DecodedInstruction {
        let instr = DecodedInstruction {
            operation: Self::decode_operation(word),
            dest: Self::decode_dest(word),
            src: Self::decode_src(word),
            immediate: Self::decode_immediate(word),
            type_tag: Self::decode_type_tag(word),
        };
        log::trace!("decoded {}", instr);
        instr
    }
}
