//! `NVMW` binary container.
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | magic `NVMW` |
//! | 4 | 4 | word length (u32 LE) |
//! | 8 | 4 | word count (u32 LE) |
//! | 12 | 8 × length × count | values (f64 LE), word by word |
//!
//! All words share one length. Shorter words are zero-padded on write,
//! which does not change how they decode.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use super::ProgramError;
use crate::interpreter::word::layout::WORD_LEN;
use crate::interpreter::word::InstructionWord;

/// Container magic.
pub const MAGIC: &[u8; 4] = b"NVMW";

const HEADER_SIZE: usize = 12;

/// Serialize `words` into a container.
pub fn encode(words: &[InstructionWord]) -> Vec<u8> {
    let word_len = words.iter().map(InstructionWord::len).max().unwrap_or(WORD_LEN);
    let mut out = Vec::with_capacity(HEADER_SIZE + words.len() * word_len * 8);

    out.extend_from_slice(MAGIC);
    // Writes into a Vec cannot fail
    let _ = out.write_u32::<LittleEndian>(word_len as u32);
    let _ = out.write_u32::<LittleEndian>(words.len() as u32);
    for word in words {
        for index in 0..word_len {
            let _ = out.write_f64::<LittleEndian>(word.get(index));
        }
    }
    out
}

/// Parse a container.
pub fn decode(data: &[u8]) -> Result<Vec<InstructionWord>, ProgramError> {
    if data.len() < HEADER_SIZE {
        return Err(ProgramError::Truncated {
            expected: HEADER_SIZE,
            actual: data.len(),
        });
    }

    let mut found = [0u8; 4];
    found.copy_from_slice(&data[..4]);
    if &found != MAGIC {
        return Err(ProgramError::BadMagic { found });
    }

    let mut cursor = Cursor::new(&data[4..]);
    let truncated = |_| ProgramError::Truncated {
        expected: HEADER_SIZE,
        actual: data.len(),
    };
    let word_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let count = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;

    let expected = word_len
        .checked_mul(count)
        .and_then(|n| n.checked_mul(8))
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .unwrap_or(usize::MAX);
    if data.len() < expected {
        return Err(ProgramError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    if data.len() > expected {
        log::warn!("Ignoring {} trailing byte(s) after program", data.len() - expected);
    }

    let mut words = Vec::with_capacity(count);
    for _ in 0..count {
        let mut values = Vec::with_capacity(word_len);
        for _ in 0..word_len {
            values.push(cursor.read_f64::<LittleEndian>().map_err(|_| ProgramError::Truncated {
                expected,
                actual: data.len(),
            })?);
        }
        words.push(InstructionWord::new(values));
    }
    log::debug!("Decoded {} word(s) of length {}", count, word_len);
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::state::Register;
    use crate::interpreter::word::{Operation, WordBuilder};

    fn sample() -> Vec<InstructionWord> {
        vec![
            WordBuilder::new(Operation::Mov).dest(Register::Eax).imm(1000).build(),
            WordBuilder::new(Operation::Hlt).build(),
        ]
    }

    #[test]
    fn test_short_program_round_trip() {
        let words = sample();
        let data = encode(&words);
        assert_eq!(&data[..4], b"NVMW");
        assert_eq!(data.len(), HEADER_SIZE + 2 * WORD_LEN * 8);
        assert_eq!(decode(&data).unwrap(), words);
    }

    #[test]
    fn test_short_words_are_padded() {
        let short = InstructionWord::new(vec![0.0, 1.0]);
        let data = encode(&[short, WordBuilder::new(Operation::Nop).build()]);
        let words = decode(&data).unwrap();
        assert_eq!(words[0].len(), WORD_LEN);
        assert_eq!(words[0].get(1), 1.0);
    }

    #[test]
    fn test_empty_program() {
        let data = encode(&[]);
        assert_eq!(data.len(), HEADER_SIZE);
        assert!(decode(&data).unwrap().is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let mut data = encode(&sample());
        data[0] = b'X';
        assert!(matches!(decode(&data), Err(ProgramError::BadMagic { found }) if &found == b"XVMW"));
    }

    #[test]
    fn test_truncated() {
        let data = encode(&sample());
        let err = decode(&data[..data.len() - 8]).unwrap_err();
        assert!(matches!(err, ProgramError::Truncated { actual, .. } if actual == data.len() - 8));

        assert!(matches!(decode(b"NVMW"), Err(ProgramError::Truncated { expected: 12, .. })));
    }
}
