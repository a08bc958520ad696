//! Reference memory/type-system collaborator.
//!
//! [`SimulatedHeap`] pairs a [`HeapAllocator`] with a [`TypeRegistry`] and
//! implements the [`Heap`] trait the interpreter executes against. Embedders
//! with their own memory model implement `Heap` directly instead.

mod allocator;
mod types;

pub use allocator::{HeapAllocator, MemoryPool, MemoryStats, PoolError, DEFAULT_HEAP_SIZE, HEAP_START};
pub use types::{StructLayout, TypeDesc, TypeError, TypeRegistry};

use crate::interpreter::traits::{AllocationInfo, FieldDef, FieldLayout, Heap, PointerInfo, TypeInfo};

/// Heap allocator plus type registry.
#[derive(Debug, Clone, Default)]
pub struct SimulatedHeap {
    pub allocator: HeapAllocator,
    pub types: TypeRegistry,
}

impl SimulatedHeap {
    /// Heap of `size` bytes with only primitive types registered.
    pub fn new(size: u32) -> Self {
        Self {
            allocator: HeapAllocator::new(size),
            types: TypeRegistry::new(),
        }
    }

    pub fn stats(&self) -> MemoryStats {
        self.allocator.stats()
    }
}

impl Heap for SimulatedHeap {
    fn allocate(&mut self, size: u32, alignment: u32, type_info: Option<TypeInfo>) -> u32 {
        self.allocator.allocate(size, alignment, type_info).unwrap_or(0)
    }

    fn deallocate(&mut self, address: u32) -> bool {
        self.allocator.deallocate(address)
    }

    fn reallocate(&mut self, address: u32, new_size: u32) -> u32 {
        self.allocator.reallocate(address, new_size).unwrap_or(0)
    }

    fn read_memory(&self, address: u32) -> u32 {
        self.allocator.read(address)
    }

    fn write_memory(&mut self, address: u32, value: u32) {
        self.allocator.write(address, value);
    }

    fn allocation_info(&self, address: u32) -> Option<AllocationInfo> {
        self.allocator.info(address)
    }

    fn define_struct(&mut self, name: &str, fields: &[FieldDef], alignment: u32) -> bool {
        match self.types.define_struct(name, fields, alignment) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("define_struct {}: {}", name, e);
                false
            }
        }
    }

    fn type_size(&self, type_name: &str) -> u32 {
        self.types.size_of(type_name)
    }

    fn struct_field(&self, struct_name: &str, index: usize) -> Option<FieldLayout> {
        self.types
            .struct_layout(struct_name)
            .and_then(|layout| layout.fields.get(index))
            .cloned()
    }

    fn create_pointer(&mut self, target: u32, target_type: &str) -> Option<u32> {
        match self.types.create_pointer(target, target_type) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("create_pointer: {}", e);
                None
            }
        }
    }

    fn pointer(&self, id: u32) -> Option<PointerInfo> {
        self.types.pointer(id).cloned()
    }
}
