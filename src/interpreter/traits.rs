//! Core traits for the interpreter.
//!
//! These traits define the abstraction boundaries that allow different
//! implementations to be swapped:
//!
//! - `Decoder`: turns an instruction word into a `DecodedInstruction`
//! - `Heap`: the memory/type-system collaborator behind every memory opcode
//! - `SyscallHandler`: the dispatcher invoked by `SYSCALL`
//!
//! The VM only talks to memory through `Heap`, so tests can run against the
//! bundled `SimulatedHeap` or a mock with canned answers.

use serde::Serialize;

use super::decode::DecodedInstruction;
use super::state::ExecutionContext;
use super::word::{InstructionWord, TypeTag};

/// Condition flags.
///
/// PF and AF are carried for completeness; no handler currently updates them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    /// Zero flag.
    pub zf: bool,
    /// Sign flag (bit 31 of the result).
    pub sf: bool,
    /// Carry flag.
    pub cf: bool,
    /// Overflow flag.
    pub of: bool,
    /// Parity flag.
    pub pf: bool,
    /// Auxiliary carry flag.
    pub af: bool,
}

impl Flags {
    /// Update ZF/SF/CF/OF after an arithmetic or logic operation.
    ///
    /// Values are the unbounded (pre-truncation) integers: `result` is what
    /// the operation produced, `previous` the destination before it and
    /// `operand` the source value. Carry and overflow use sign comparisons on
    /// those unbounded values, not two's-complement bit tests.
    #[inline]
    pub fn update_arith(&mut self, result: i128, previous: i128, operand: i128) {
        self.zf = result == 0;
        self.sf = result & 0x8000_0000 != 0;
        self.cf = result < previous && previous >= 0;
        self.of = (previous > 0 && operand > 0 && result < 0)
            || (previous < 0 && operand < 0 && result > 0);
    }
}

/// Control-flow outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteResult {
    /// Continue to the next instruction (pc + 1).
    Continue,

    /// Branch to target.
    Branch {
        /// Target program counter.
        target: i64,
    },

    /// Thread blocked; the same instruction is retried once it is woken.
    Blocked,

    /// Thread yielded; advances like `Continue`.
    Yield,

    /// Thread finished.
    Halt {
        /// Program counter recorded for the halted thread.
        next_pc: i64,
    },
}

impl ExecuteResult {
    /// Program counter the thread moves to after this result.
    #[inline]
    pub fn next_pc(self, pc: i64) -> i64 {
        match self {
            ExecuteResult::Continue | ExecuteResult::Yield => pc + 1,
            ExecuteResult::Branch { target } => target,
            ExecuteResult::Blocked => pc,
            ExecuteResult::Halt { next_pc } => next_pc,
        }
    }
}

/// Trait for instruction decoding.
///
/// Decoding never fails: fields that cannot be decoded come back as `None`
/// and an unrecognised operation as `Operation::Unknown`.
pub trait Decoder: Send + Sync {
    /// Decode one instruction word.
    fn decode(&self, word: &InstructionWord) -> DecodedInstruction;
}

// ============================================================================
// Memory/type-system collaborator
// ============================================================================

/// Type metadata attached to an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInfo {
    /// Allocation of a primitive or tagged type.
    Tagged(TypeTag),
    /// Method table of a class.
    Vtable { class: String },
    /// Instance of a class.
    Instance { class: String },
    /// Instance of a named struct.
    Struct { name: String },
    /// Array with fixed element size.
    Array { element_size: u32 },
}

impl TypeInfo {
    /// Class name carried by vtable and instance metadata.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeInfo::Vtable { class } | TypeInfo::Instance { class } => Some(class),
            _ => None,
        }
    }
}

/// Record of a live allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationInfo {
    pub address: u32,
    pub size: u32,
    pub alignment: u32,
    pub type_info: Option<TypeInfo>,
}

/// A named, typed field in a struct or class schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub type_name: String,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Resolved placement of a struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub type_name: String,
    pub offset: u32,
    pub size: u32,
}

/// A typed pointer registered with the type system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerInfo {
    pub id: u32,
    pub target: u32,
    pub target_type: String,
}

impl PointerInfo {
    #[inline]
    pub fn is_null(&self) -> bool {
        self.target == 0
    }
}

/// Heap allocator and type registry used by memory, struct and object opcodes.
///
/// Address 0 is never a valid allocation; methods returning an address use it
/// to signal failure.
pub trait Heap {
    /// Allocate `size` bytes. Returns 0 on failure.
    fn allocate(&mut self, size: u32, alignment: u32, type_info: Option<TypeInfo>) -> u32;

    /// Free an allocation. Returns `false` for unknown addresses.
    fn deallocate(&mut self, address: u32) -> bool;

    /// Resize an allocation, possibly moving it. Returns the new address or 0.
    fn reallocate(&mut self, address: u32, new_size: u32) -> u32;

    /// Read one memory cell (0 if never written).
    fn read_memory(&self, address: u32) -> u32;

    /// Write one memory cell.
    fn write_memory(&mut self, address: u32, value: u32);

    /// Metadata of the allocation starting at `address`.
    fn allocation_info(&self, address: u32) -> Option<AllocationInfo>;

    /// Register a struct type. Returns `false` on duplicates or bad fields.
    fn define_struct(&mut self, name: &str, fields: &[FieldDef], alignment: u32) -> bool;

    /// Size in bytes of a named type (0 if unknown).
    fn type_size(&self, type_name: &str) -> u32;

    /// Layout of the `index`-th field of a struct.
    fn struct_field(&self, struct_name: &str, index: usize) -> Option<FieldLayout>;

    /// Register a typed pointer. Returns its id, or `None` for unknown types.
    fn create_pointer(&mut self, target: u32, target_type: &str) -> Option<u32>;

    /// Look up a pointer by id.
    fn pointer(&self, id: u32) -> Option<PointerInfo>;
}

/// Dispatcher for the `SYSCALL` opcode.
pub trait SyscallHandler {
    /// Service a system call. Arguments and results live in the registers.
    fn dispatch(&mut self, ctx: &mut ExecutionContext, heap: &mut dyn Heap);
}

/// Syscall handler that services nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSyscalls;

impl SyscallHandler for NullSyscalls {
    fn dispatch(&mut self, ctx: &mut ExecutionContext, _heap: &mut dyn Heap) {
        log::debug!(
            "SYSCALL {} ignored (no handler installed)",
            ctx.read(crate::interpreter::state::Register::Eax)
        );
    }
}
