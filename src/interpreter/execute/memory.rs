//! Memory unit execution.
//!
//! Loads, stores, heap/string/array allocation and SYSCALL. Every access goes
//! through the [`Heap`] collaborator; failures come back as address 0 and
//! leave EAX untouched.

use crate::interpreter::decode::DecodedInstruction;
use crate::interpreter::machine::Machine;
use crate::interpreter::state::{Gpr, Register};
use crate::interpreter::traits::{Heap, TypeInfo};
use crate::interpreter::word::{Operation, TypeTag};

use super::Outcome;

/// Alignment of HEAP_ALLOC blocks.
pub const HEAP_ALLOC_ALIGNMENT: u32 = 16;

/// Memory unit.
pub struct MemoryUnit;

impl MemoryUnit {
    /// Execute a memory operation for thread `tid`.
    ///
    /// Returns `None` if the operation does not belong to this unit.
    pub fn execute<H: Heap>(m: &mut Machine<H>, tid: usize, instr: &DecodedInstruction) -> Option<Outcome> {
        let dest = instr.dest.unwrap_or(Register::Eax);

        let outcome = match instr.operation {
            Operation::MemStore | Operation::MemStoreShared => {
                let ctx = m.ctx(tid);
                let address = ctx.read(dest);
                let value = ctx.read_or(instr.src, Gpr::Ecx);
                m.heap.write_memory(address, value);
                log::trace!("T{} [0x{:08X}] <- {}", tid, address, value);
                Outcome::next(value as i64)
            }

            Operation::MemLoad | Operation::MemLoadShared => {
                let address_reg = instr.src.or(instr.dest).unwrap_or(Register::Eax);
                let address = m.ctx(tid).read(address_reg);
                let value = m.heap.read_memory(address);
                m.ctx(tid).write(dest, value);
                log::trace!("T{} [0x{:08X}] -> {} = {}", tid, address, dest, value);
                Outcome::next(value as i64)
            }

            Operation::HeapAlloc => {
                let size = match instr.immediate {
                    Some(imm) => imm as u32,
                    None => m.ctx(tid).regs.get(Gpr::Eax),
                };
                let type_info = instr.type_tag.map(TypeInfo::Tagged);
                let address = m.heap.allocate(size, HEAP_ALLOC_ALIGNMENT, type_info);
                Self::return_address(m, tid, address)
            }

            Operation::HeapFree => {
                let address = m.ctx(tid).read(dest);
                Outcome::next(m.heap.deallocate(address) as i64)
            }

            Operation::StrAlloc => {
                let size = m.ctx(tid).regs.get(Gpr::Eax);
                let address = m.heap.allocate(size, 1, Some(TypeInfo::Tagged(TypeTag::String)));
                Self::return_address(m, tid, address)
            }

            Operation::StrConcat => {
                let address = Self::concat(m, tid);
                Self::return_address(m, tid, address)
            }

            Operation::ArrayAlloc => {
                let ctx = m.ctx(tid);
                let element_size = ctx.regs.get(Gpr::Eax);
                let count = ctx.regs.get(Gpr::Ecx);
                let address = match element_size.checked_mul(count) {
                    Some(total) => m.heap.allocate(total, element_size, Some(TypeInfo::Array { element_size })),
                    None => 0,
                };
                Self::return_address(m, tid, address)
            }

            Operation::ArrayResize => {
                let ctx = m.ctx(tid);
                let address = ctx.regs.get(Gpr::Eax);
                let count = ctx.regs.get(Gpr::Ecx);
                let resized = match m.heap.allocation_info(address).and_then(|info| info.type_info) {
                    Some(TypeInfo::Array { element_size }) => element_size
                        .checked_mul(count)
                        .map(|size| m.heap.reallocate(address, size))
                        .unwrap_or(0),
                    _ => {
                        log::debug!("ARRAY_RESIZE of non-array 0x{:08X}", address);
                        0
                    }
                };
                Self::return_address(m, tid, resized)
            }

            Operation::Syscall => {
                let Machine {
                    threads,
                    heap,
                    syscalls,
                    ..
                } = m;
                let ctx = &mut threads[tid].context;
                syscalls.dispatch(ctx, heap);
                Outcome::next(ctx.regs.get(Gpr::Eax) as i64)
            }

            _ => return None,
        };
        Some(outcome)
    }

    /// Store a non-zero address in EAX.
    fn return_address<H: Heap>(m: &mut Machine<H>, tid: usize, address: u32) -> Outcome {
        if address != 0 {
            m.ctx(tid).regs.set(Gpr::Eax, address);
        }
        Outcome::next(address as i64)
    }

    /// New string holding the cells of the strings at EAX and EBX.
    fn concat<H: Heap>(m: &mut Machine<H>, tid: usize) -> u32 {
        let ctx = m.ctx(tid);
        let first = ctx.regs.get(Gpr::Eax);
        let second = ctx.regs.get(Gpr::Ebx);

        let (Some(a), Some(b)) = (m.heap.allocation_info(first), m.heap.allocation_info(second)) else {
            log::debug!("STR_CONCAT with unallocated operand 0x{:08X}/0x{:08X}", first, second);
            return 0;
        };
        let Some(size) = a.size.checked_add(b.size) else {
            return 0;
        };

        let address = m.heap.allocate(size, 1, Some(TypeInfo::Tagged(TypeTag::String)));
        if address == 0 {
            return 0;
        }
        for offset in 0..a.size {
            let cell = m.heap.read_memory(first + offset);
            m.heap.write_memory(address + offset, cell);
        }
        for offset in 0..b.size {
            let cell = m.heap.read_memory(second + offset);
            m.heap.write_memory(address + a.size + offset, cell);
        }
        address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::state::ExecutionContext;
    use crate::interpreter::traits::SyscallHandler;
    use crate::memory::HEAP_START;

    fn op(operation: Operation) -> DecodedInstruction {
        DecodedInstruction::new(operation)
    }

    #[test]
    fn test_store_then_load() {
        let mut m: Machine = Machine::default();
        m.ctx(0).write(Register::Eax, 0x40);
        m.ctx(0).write(Register::Ecx, 123);
        assert_eq!(MemoryUnit::execute(&mut m, 0, &op(Operation::MemStore)), Some(Outcome::next(123)));

        // Address from src, value into dest
        m.ctx(0).write(Register::Esi, 0x40);
        let load = DecodedInstruction {
            dest: Some(Register::Edx),
            src: Some(Register::Esi),
            ..op(Operation::MemLoadShared)
        };
        assert_eq!(MemoryUnit::execute(&mut m, 0, &load), Some(Outcome::next(123)));
        assert_eq!(m.ctx(0).read(Register::Edx), 123);
    }

    #[test]
    fn test_heap_alloc_and_free() {
        let mut m: Machine = Machine::default();
        let alloc = DecodedInstruction {
            immediate: Some(64),
            type_tag: Some(TypeTag::Int),
            ..op(Operation::HeapAlloc)
        };
        let out = MemoryUnit::execute(&mut m, 0, &alloc).unwrap();
        assert_eq!(out.result, HEAP_START as i64);
        assert_eq!(m.ctx(0).read(Register::Eax), HEAP_START);

        let info = m.heap.allocation_info(HEAP_START).unwrap();
        assert_eq!(info.alignment, HEAP_ALLOC_ALIGNMENT);
        assert_eq!(info.type_info, Some(TypeInfo::Tagged(TypeTag::Int)));

        assert_eq!(MemoryUnit::execute(&mut m, 0, &op(Operation::HeapFree)), Some(Outcome::next(1)));
        assert_eq!(MemoryUnit::execute(&mut m, 0, &op(Operation::HeapFree)), Some(Outcome::next(0)));
    }

    #[test]
    fn test_failed_alloc_keeps_eax() {
        let mut m: Machine = Machine::default();
        m.ctx(0).write(Register::Eax, 0);
        assert_eq!(MemoryUnit::execute(&mut m, 0, &op(Operation::StrAlloc)), Some(Outcome::next(0)));
        assert_eq!(m.ctx(0).read(Register::Eax), 0);
    }

    #[test]
    fn test_str_concat_copies_cells() {
        let mut m: Machine = Machine::default();
        let a = m.heap.allocate(2, 1, Some(TypeInfo::Tagged(TypeTag::String)));
        let b = m.heap.allocate(3, 1, Some(TypeInfo::Tagged(TypeTag::String)));
        m.heap.write_memory(a, 'h' as u32);
        m.heap.write_memory(a + 1, 'i' as u32);
        m.heap.write_memory(b + 2, '!' as u32);
        m.ctx(0).write(Register::Eax, a);
        m.ctx(0).write(Register::Ebx, b);

        let out = MemoryUnit::execute(&mut m, 0, &op(Operation::StrConcat)).unwrap();
        let joined = out.result as u32;
        assert_eq!(m.heap.allocation_info(joined).unwrap().size, 5);
        assert_eq!(m.heap.read_memory(joined + 1), 'i' as u32);
        assert_eq!(m.heap.read_memory(joined + 4), '!' as u32);
        assert_eq!(m.ctx(0).read(Register::Eax), joined);
    }

    #[test]
    fn test_array_alloc_and_resize() {
        let mut m: Machine = Machine::default();
        m.ctx(0).write(Register::Eax, 4);
        m.ctx(0).write(Register::Ecx, 8);
        let out = MemoryUnit::execute(&mut m, 0, &op(Operation::ArrayAlloc)).unwrap();
        let array = out.result as u32;
        assert_eq!(m.heap.allocation_info(array).unwrap().size, 32);

        m.ctx(0).write(Register::Ecx, 2);
        let out = MemoryUnit::execute(&mut m, 0, &op(Operation::ArrayResize)).unwrap();
        assert_eq!(out.result as u32, array);
        assert_eq!(m.heap.allocation_info(array).unwrap().size, 8);

        // Not an array
        let plain = m.heap.allocate(4, 4, None);
        m.ctx(0).write(Register::Eax, plain);
        assert_eq!(MemoryUnit::execute(&mut m, 0, &op(Operation::ArrayResize)), Some(Outcome::next(0)));
    }

    struct WriteEax(u32);

    impl SyscallHandler for WriteEax {
        fn dispatch(&mut self, ctx: &mut ExecutionContext, heap: &mut dyn Heap) {
            heap.write_memory(0x10, self.0);
            ctx.regs.set(Gpr::Eax, self.0);
        }
    }

    #[test]
    fn test_syscall_dispatch() {
        let mut m: Machine = Machine::default();
        m.syscalls = Box::new(WriteEax(9));
        assert_eq!(MemoryUnit::execute(&mut m, 0, &op(Operation::Syscall)), Some(Outcome::next(9)));
        assert_eq!(m.heap.read_memory(0x10), 9);

        let mut quiet: Machine = Machine::default();
        quiet.ctx(0).write(Register::Eax, 3);
        assert_eq!(MemoryUnit::execute(&mut quiet, 0, &op(Operation::Syscall)), Some(Outcome::next(3)));
    }
}
