//! Instruction decoder.
//!
//! Decoding turns an [`InstructionWord`](crate::interpreter::word::InstructionWord)
//! into a [`DecodedInstruction`]. It is a pure function of the word:
//!
//! | Field | Rule |
//! |-------|------|
//! | operation | argmax over the opcode table, `Unknown` below 0.5 |
//! | dest | argmax over 72..104, table lookup, unmapped offsets give `None` |
//! | src | argmax over 160..192, table lookup |
//! | immediate | literal table, then large-immediate bitfield, then raw fallback slot |
//! | type_tag | argmax over 128..160, table lookup |
//!
//! # Example
//!
//! ```
//! use neural_vm::interpreter::decode::WordDecoder;
//! use neural_vm::interpreter::traits::Decoder;
//! use neural_vm::interpreter::word::{Operation, WordBuilder};
//!
//! let word = WordBuilder::new(Operation::Nop).build();
//! let instr = WordDecoder::new().decode(&word);
//! assert_eq!(instr.operation, Operation::Nop);
//! ```

mod decoder;

pub use decoder::WordDecoder;

use serde::Serialize;
use std::fmt;

use crate::interpreter::state::Register;
use crate::interpreter::word::{Operation, TypeTag};

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodedInstruction {
    pub operation: Operation,
    pub dest: Option<Register>,
    pub src: Option<Register>,
    pub immediate: Option<i32>,
    pub type_tag: Option<TypeTag>,
}

impl DecodedInstruction {
    /// Instruction with no operands.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            dest: None,
            src: None,
            immediate: None,
            type_tag: None,
        }
    }

    /// Instruction with every field absent.
    pub fn unknown() -> Self {
        Self::new(Operation::Unknown)
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        let mut sep = " ";
        if let Some(dest) = self.dest {
            write!(f, "{}{}", sep, dest)?;
            sep = ", ";
        }
        if let Some(src) = self.src {
            write!(f, "{}{}", sep, src)?;
            sep = ", ";
        }
        if let Some(imm) = self.immediate {
            write!(f, "{}{}", sep, imm)?;
            sep = ", ";
        }
        if let Some(tag) = self.type_tag {
            write!(f, "{}:{}", sep, tag)?;
        }
        Ok(())
    }
}
