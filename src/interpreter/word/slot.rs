//! Operation and type-tag enums.

use serde::{Serialize, Serializer};
use std::fmt;

/// Decoded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    // Data movement and arithmetic
    Mov,
    Add,
    Sub,
    Inc,
    Dec,
    Xor,
    And,
    Or,
    Cmp,
    Test,
    Shl,
    Shr,
    Not,
    Neg,
    Mul,
    Div,

    // Control flow
    Jmp,
    Je,
    Jne,
    Jg,
    Jl,
    Call,
    Ret,
    Push,
    Pop,
    Nop,
    Int,
    Hlt,

    // Function and memory primitives
    FnDefine,
    FnCall,
    FnRet,
    MemAlloc,
    MemIndex,
    MemStore,
    MemLoad,
    Syscall,

    // Structs, pointers and heap
    StructDefine,
    StructInit,
    StructField,
    UnionDefine,
    UnionAccess,
    PtrCreate,
    PtrDeref,
    PtrArith,
    RefCreate,
    RefDeref,
    HeapAlloc,
    HeapFree,
    HeapRealloc,
    HeapClear,
    MemPool,

    // Objects
    ClassDefine,
    ClassInst,
    MethodCall,
    Inherit,
    Polymorph,
    TypeCast,
    StrAlloc,
    StrConcat,
    ArrayAlloc,
    ArrayResize,

    // Threads and synchronization
    ThreadSpawn,
    ThreadJoin,
    ThreadExit,
    ThreadYield,
    MutexCreate,
    MutexLock,
    MutexUnlock,
    BarrierWait,
    AtomicAdd,
    AtomicCmpxchg,
    MemLoadShared,
    MemStoreShared,

    /// No opcode slot cleared the threshold.
    Unknown,
}

impl Operation {
    const MNEMONICS: [(Operation, &'static str); 74] = [
        (Operation::Mov, "MOV"),
        (Operation::Add, "ADD"),
        (Operation::Sub, "SUB"),
        (Operation::Inc, "INC"),
        (Operation::Dec, "DEC"),
        (Operation::Xor, "XOR"),
        (Operation::And, "AND"),
        (Operation::Or, "OR"),
        (Operation::Cmp, "CMP"),
        (Operation::Test, "TEST"),
        (Operation::Shl, "SHL"),
        (Operation::Shr, "SHR"),
        (Operation::Not, "NOT"),
        (Operation::Neg, "NEG"),
        (Operation::Mul, "MUL"),
        (Operation::Div, "DIV"),
        (Operation::Jmp, "JMP"),
        (Operation::Je, "JE"),
        (Operation::Jne, "JNE"),
        (Operation::Jg, "JG"),
        (Operation::Jl, "JL"),
        (Operation::Call, "CALL"),
        (Operation::Ret, "RET"),
        (Operation::Push, "PUSH"),
        (Operation::Pop, "POP"),
        (Operation::Nop, "NOP"),
        (Operation::Int, "INT"),
        (Operation::Hlt, "HLT"),
        (Operation::FnDefine, "FN_DEFINE"),
        (Operation::FnCall, "FN_CALL"),
        (Operation::FnRet, "FN_RET"),
        (Operation::MemAlloc, "MEM_ALLOC"),
        (Operation::MemIndex, "MEM_INDEX"),
        (Operation::MemStore, "MEM_STORE"),
        (Operation::MemLoad, "MEM_LOAD"),
        (Operation::Syscall, "SYSCALL"),
        (Operation::StructDefine, "STRUCT_DEFINE"),
        (Operation::StructInit, "STRUCT_INIT"),
        (Operation::StructField, "STRUCT_FIELD"),
        (Operation::UnionDefine, "UNION_DEFINE"),
        (Operation::UnionAccess, "UNION_ACCESS"),
        (Operation::PtrCreate, "PTR_CREATE"),
        (Operation::PtrDeref, "PTR_DEREF"),
        (Operation::PtrArith, "PTR_ARITH"),
        (Operation::RefCreate, "REF_CREATE"),
        (Operation::RefDeref, "REF_DEREF"),
        (Operation::HeapAlloc, "HEAP_ALLOC"),
        (Operation::HeapFree, "HEAP_FREE"),
        (Operation::HeapRealloc, "HEAP_REALLOC"),
        (Operation::HeapClear, "HEAP_CLEAR"),
        (Operation::MemPool, "MEM_POOL"),
        (Operation::ClassDefine, "CLASS_DEFINE"),
        (Operation::ClassInst, "CLASS_INST"),
        (Operation::MethodCall, "METHOD_CALL"),
        (Operation::Inherit, "INHERIT"),
        (Operation::Polymorph, "POLYMORPH"),
        (Operation::TypeCast, "TYPE_CAST"),
        (Operation::StrAlloc, "STR_ALLOC"),
        (Operation::StrConcat, "STR_CONCAT"),
        (Operation::ArrayAlloc, "ARRAY_ALLOC"),
        (Operation::ArrayResize, "ARRAY_RESIZE"),
        (Operation::ThreadSpawn, "THREAD_SPAWN"),
        (Operation::ThreadJoin, "THREAD_JOIN"),
        (Operation::ThreadExit, "THREAD_EXIT"),
        (Operation::ThreadYield, "THREAD_YIELD"),
        (Operation::MutexCreate, "MUTEX_CREATE"),
        (Operation::MutexLock, "MUTEX_LOCK"),
        (Operation::MutexUnlock, "MUTEX_UNLOCK"),
        (Operation::BarrierWait, "BARRIER_WAIT"),
        (Operation::AtomicAdd, "ATOMIC_ADD"),
        (Operation::AtomicCmpxchg, "ATOMIC_CMPXCHG"),
        (Operation::MemLoadShared, "MEM_LOAD_SHARED"),
        (Operation::MemStoreShared, "MEM_STORE_SHARED"),
        (Operation::Unknown, "UNKNOWN"),
    ];

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        Self::MNEMONICS
            .iter()
            .find(|(op, _)| *op == self)
            .map(|(_, name)| *name)
            .unwrap_or("UNKNOWN")
    }

    /// Parse a mnemonic, case-insensitive.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::MNEMONICS
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(op, _)| *op)
    }

    /// Opcodes that exist in the table but whose handler only reports
    /// success.
    pub fn is_stub(self) -> bool {
        matches!(
            self,
            Operation::HeapRealloc
                | Operation::HeapClear
                | Operation::MemPool
                | Operation::UnionDefine
                | Operation::UnionAccess
                | Operation::PtrArith
                | Operation::RefCreate
                | Operation::RefDeref
                | Operation::MethodCall
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.mnemonic())
    }
}

/// Type tag carried by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Int,
    Float,
    Double,
    Char,
    Bool,
    String,
    Void,
    Struct,
    Union,
    Class,
    Pointer,
    Reference,
}

impl TypeTag {
    /// Type-system name.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::Char => "char",
            TypeTag::Bool => "bool",
            TypeTag::String => "string",
            TypeTag::Void => "void",
            TypeTag::Struct => "struct",
            TypeTag::Union => "union",
            TypeTag::Class => "class",
            TypeTag::Pointer => "pointer",
            TypeTag::Reference => "reference",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        super::layout::TYPE_TAGS
            .iter()
            .find(|tag| tag.name().eq_ignore_ascii_case(name))
            .copied()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
