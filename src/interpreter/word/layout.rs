//! Field layout of an instruction word.
//!
//! Every field is a sub-range of float slots; a field is "selected" by
//! driving one slot in its range high. All ranges are zero-based and
//! half-open.
//!
//! | Field | Range | Table |
//! |-------|-------|-------|
//! | Operation | sparse (see `OPCODE_TABLE`) | 73 entries |
//! | Destination register | 72..104 | 24 entries (72..96) |
//! | Small immediate | 104..123 | 19 literals |
//! | Large-immediate flag | 123 | - |
//! | Type tag | 128..160 | 12 entries (128..140) |
//! | Source register | 160..192 | 8 entries (160..168) |
//! | Large-immediate bits | 200..232 | bit i at 200 + i |
//! | Raw immediate fallback | 256 | truncated to integer |
//!
//! Some ranges overlap opcode indices (NOP/INT/HLT sit inside the
//! destination range, FN_DEFINE..MEM_LOAD and SYSCALL inside the type-tag
//! range). Decoding does not special-case this.

use std::ops::Range;

use super::slot::{Operation, TypeTag};
use crate::interpreter::state::Register;

/// Minimum word length accepted by the wire format.
pub const MIN_WORD_LEN: usize = 316;

/// Length of words produced by the encoder (covers every opcode index).
pub const WORD_LEN: usize = 412;

/// Selection threshold for every one-hot field.
pub const THRESHOLD: f64 = 0.5;

/// Destination register range.
pub const DEST_RANGE: Range<usize> = 72..104;

/// Small immediate range.
pub const IMM_RANGE: Range<usize> = 104..123;

/// Large-immediate flag slot.
pub const IMM_LARGE_FLAG: usize = 123;

/// Type tag range.
pub const TYPE_RANGE: Range<usize> = 128..160;

/// Source register range.
pub const SRC_RANGE: Range<usize> = 160..192;

/// First of the 32 large-immediate bit slots (bit 0).
pub const IMM_BITS_START: usize = 200;

/// Raw immediate fallback slot.
pub const IMM_FALLBACK: usize = 256;

/// Smallest magnitude the fallback slot must exceed to count.
pub const IMM_FALLBACK_EPSILON: f64 = 0.001;

/// Opcode table in decode priority order: on equal activations the earlier
/// entry wins.
pub const OPCODE_TABLE: [(usize, Operation); 73] = [
    (0, Operation::Mov),
    (32, Operation::Add),
    (33, Operation::Sub),
    (34, Operation::Inc),
    (35, Operation::Dec),
    (36, Operation::Xor),
    (37, Operation::And),
    (38, Operation::Or),
    (39, Operation::Cmp),
    (40, Operation::Test),
    (41, Operation::Shl),
    (42, Operation::Shr),
    (43, Operation::Not),
    (44, Operation::Neg),
    (45, Operation::Mul),
    (47, Operation::Div),
    (64, Operation::Jmp),
    (66, Operation::Je),
    (67, Operation::Jne),
    (68, Operation::Jg),
    (69, Operation::Jl),
    (70, Operation::Call),
    (71, Operation::Ret),
    (4, Operation::Push),
    (5, Operation::Pop),
    (96, Operation::Nop),
    (97, Operation::Int),
    (98, Operation::Hlt),
    (128, Operation::FnDefine),
    (129, Operation::FnCall),
    (130, Operation::FnRet),
    (131, Operation::MemAlloc),
    (132, Operation::MemIndex),
    (133, Operation::MemStore),
    (134, Operation::MemLoad),
    (150, Operation::Syscall),
    (350, Operation::StructDefine),
    (351, Operation::StructInit),
    (352, Operation::StructField),
    (353, Operation::UnionDefine),
    (354, Operation::UnionAccess),
    (355, Operation::PtrCreate),
    (356, Operation::PtrDeref),
    (357, Operation::PtrArith),
    (358, Operation::RefCreate),
    (359, Operation::RefDeref),
    (360, Operation::HeapAlloc),
    (361, Operation::HeapFree),
    (362, Operation::HeapRealloc),
    (363, Operation::HeapClear),
    (364, Operation::MemPool),
    (365, Operation::ClassDefine),
    (366, Operation::ClassInst),
    (367, Operation::MethodCall),
    (368, Operation::Inherit),
    (369, Operation::Polymorph),
    (370, Operation::TypeCast),
    (371, Operation::StrAlloc),
    (372, Operation::StrConcat),
    (373, Operation::ArrayAlloc),
    (374, Operation::ArrayResize),
    (400, Operation::ThreadSpawn),
    (401, Operation::ThreadJoin),
    (402, Operation::ThreadExit),
    (403, Operation::ThreadYield),
    (404, Operation::MutexCreate),
    (405, Operation::MutexLock),
    (406, Operation::MutexUnlock),
    (407, Operation::BarrierWait),
    (408, Operation::AtomicAdd),
    (409, Operation::AtomicCmpxchg),
    (410, Operation::MemLoadShared),
    (411, Operation::MemStoreShared),
];

/// Destination register by offset from `DEST_RANGE.start`. Offsets 24..32
/// are unmapped.
pub const DEST_REGISTERS: [Register; 24] = [
    Register::Eax,
    Register::Ecx,
    Register::Edx,
    Register::Ebx,
    Register::Esp,
    Register::Ebp,
    Register::Esi,
    Register::Edi,
    Register::Al,
    Register::Cl,
    Register::Dl,
    Register::Bl,
    Register::Ah,
    Register::Ch,
    Register::Dh,
    Register::Bh,
    Register::Ax,
    Register::Cx,
    Register::Dx,
    Register::Bx,
    Register::Sp,
    Register::Bp,
    Register::Si,
    Register::Di,
];

/// Source register by offset from `SRC_RANGE.start`. Offsets 8..32 are
/// unmapped.
pub const SRC_REGISTERS: [Register; 8] = [
    Register::Eax,
    Register::Ecx,
    Register::Edx,
    Register::Ebx,
    Register::Esp,
    Register::Ebp,
    Register::Esi,
    Register::Edi,
];

/// Literal by offset from `IMM_RANGE.start`.
pub const SMALL_IMMEDIATES: [i32; 19] = [
    0, 1, 2, 4, 8, 16, 32, 64, 128, 256, -1, -2, -4, -8, -16, -32, -64, -128, -256,
];

/// Type tag by offset from `TYPE_RANGE.start`. Offsets 12..32 are unmapped.
pub const TYPE_TAGS: [TypeTag; 12] = [
    TypeTag::Int,
    TypeTag::Float,
    TypeTag::Double,
    TypeTag::Char,
    TypeTag::Bool,
    TypeTag::String,
    TypeTag::Void,
    TypeTag::Struct,
    TypeTag::Union,
    TypeTag::Class,
    TypeTag::Pointer,
    TypeTag::Reference,
];

/// Word index of an operation's opcode slot.
pub fn opcode_index(op: Operation) -> Option<usize> {
    OPCODE_TABLE
        .iter()
        .find(|(_, entry)| *entry == op)
        .map(|(index, _)| *index)
}

/// Word index selecting `reg` as destination.
pub fn dest_index(reg: Register) -> Option<usize> {
    DEST_REGISTERS
        .iter()
        .position(|r| *r == reg)
        .map(|offset| DEST_RANGE.start + offset)
}

/// Word index selecting `reg` as source.
pub fn src_index(reg: Register) -> Option<usize> {
    SRC_REGISTERS
        .iter()
        .position(|r| *r == reg)
        .map(|offset| SRC_RANGE.start + offset)
}

/// Word index of a small literal.
pub fn small_immediate_index(value: i32) -> Option<usize> {
    SMALL_IMMEDIATES
        .iter()
        .position(|v| *v == value)
        .map(|offset| IMM_RANGE.start + offset)
}

/// Word index of a type tag.
pub fn type_index(tag: TypeTag) -> Option<usize> {
    TYPE_TAGS
        .iter()
        .position(|t| *t == tag)
        .map(|offset| TYPE_RANGE.start + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_opcode_indices_are_unique() {
        let indices: HashSet<_> = OPCODE_TABLE.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices.len(), OPCODE_TABLE.len());
        assert!(OPCODE_TABLE.iter().all(|(i, _)| *i < WORD_LEN));
    }

    #[test]
    fn test_opcode_index_lookup() {
        assert_eq!(opcode_index(Operation::Add), Some(32));
        assert_eq!(opcode_index(Operation::StructDefine), Some(350));
        assert_eq!(opcode_index(Operation::MemStoreShared), Some(411));
        assert_eq!(opcode_index(Operation::Unknown), None);
    }

    #[test]
    fn test_register_indices() {
        assert_eq!(dest_index(Register::Eax), Some(72));
        assert_eq!(dest_index(Register::Al), Some(80));
        assert_eq!(dest_index(Register::Di), Some(95));
        assert_eq!(dest_index(Register::Eip), None);
        assert_eq!(src_index(Register::Edi), Some(167));
        assert_eq!(src_index(Register::Ax), None);
    }

    #[test]
    fn test_literal_and_type_indices() {
        assert_eq!(small_immediate_index(1), Some(105));
        assert_eq!(small_immediate_index(-256), Some(122));
        assert_eq!(small_immediate_index(3), None);
        assert_eq!(type_index(TypeTag::Reference), Some(139));
    }
}
