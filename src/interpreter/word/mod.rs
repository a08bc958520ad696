//! Instruction words.
//!
//! An instruction word is a fixed-length vector of floats. Each field of an
//! instruction (operation, registers, immediate, type tag) occupies a
//! sub-range of the vector and is selected one-hot: the slot with the
//! strongest activation wins if it clears the threshold. See [`layout`] for
//! the ranges and tables.
//!
//! # Example
//!
//! ```
//! use neural_vm::interpreter::word::{Operation, WordBuilder};
//! use neural_vm::interpreter::state::Register;
//!
//! let word = WordBuilder::new(Operation::Add)
//!     .dest(Register::Eax)
//!     .imm(1)
//!     .build();
//! assert_eq!(word.get(32), 1.0);
//! ```

pub mod encoding;
pub mod layout;
mod slot;

pub use encoding::WordBuilder;
pub use slot::{Operation, TypeTag};

/// One instruction word.
///
/// Indices past the end read as 0.0, so short words decode the same as words
/// padded with zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionWord {
    values: Vec<f64>,
}

impl InstructionWord {
    /// Wrap raw values.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// All-zero word of the encoder's length.
    pub fn zeroed() -> Self {
        Self::new(vec![0.0; layout::WORD_LEN])
    }

    /// Value at `index`, 0.0 past the end.
    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    /// Value at `index` as seen by the decoder: NaN counts as 0.0, so it can
    /// neither be selected nor shadow a later slot.
    #[inline]
    pub fn activation(&self, index: usize) -> f64 {
        let value = self.get(index);
        if value.is_nan() {
            0.0
        } else {
            value
        }
    }

    /// Set the value at `index`, growing the word with zeros if needed.
    pub fn set(&mut self, index: usize, value: f64) {
        if index >= self.values.len() {
            self.values.resize(index + 1, 0.0);
        }
        self.values[index] = value;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Index and value of the strongest slot in `range` (first one on ties).
    pub fn argmax(&self, range: std::ops::Range<usize>) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for index in range {
            let value = self.activation(index);
            match best {
                Some((_, max)) if !(value > max) => {}
                _ => best = Some((index, value)),
            }
        }
        best
    }
}

impl From<Vec<f64>> for InstructionWord {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}
