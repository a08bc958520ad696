//! Best-fit heap allocator with a sparse cell store.
//!
//! The heap is a contiguous address range starting at [`HEAP_START`]. Free
//! space is a list of `(address, length)` blocks kept sorted by address and
//! coalesced on every free. Memory contents are modelled as one `u32` cell
//! per address in a `BTreeMap`, so unwritten cells read as zero and large
//! heaps cost nothing until touched.
//!
//! # Allocation
//!
//! 1. Alignment is rounded down to a power of two (0 counts as 1)
//! 2. The size is rounded up to the alignment
//! 3. The smallest free block that can hold alignment padding plus the size
//!    is split; padding and tail go back to the free list
//!
//! # Usage
//!
//! ```
//! use neural_vm::memory::HeapAllocator;
//!
//! let mut heap = HeapAllocator::new(4096);
//! let a = heap.allocate(100, 16, None).unwrap();
//! assert_eq!(a % 16, 0);
//! heap.write(a, 42);
//! assert_eq!(heap.read(a), 42);
//! assert!(heap.deallocate(a));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use super::types::align_up;
use crate::interpreter::traits::{AllocationInfo, TypeInfo};

/// First heap address.
pub const HEAP_START: u32 = 0x10_0000;

/// Default heap size (1 MiB).
pub const DEFAULT_HEAP_SIZE: u32 = 1024 * 1024;

/// Errors from memory pool operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool '{0}' already exists")]
    Exists(String),

    #[error("pool '{0}' not found")]
    NotFound(String),

    #[error("pool '{name}' could not allocate {bytes} bytes")]
    OutOfMemory { name: String, bytes: u32 },

    #[error("address 0x{address:08X} is not an allocated block of pool '{name}'")]
    BadBlock { name: String, address: u32 },
}

#[derive(Debug, Clone)]
struct Block {
    size: u32,
    alignment: u32,
    type_info: Option<TypeInfo>,
}

/// Fixed-size block pool carved from one heap allocation.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    /// Base address of the pool.
    pub address: u32,
    /// Size of each block.
    pub block_size: u32,
    /// Number of blocks.
    pub blocks: u32,
    free: BTreeSet<u32>,
}

impl MemoryPool {
    /// Number of blocks currently handed out.
    pub fn in_use(&self) -> u32 {
        self.blocks - self.free.len() as u32
    }
}

/// Snapshot of allocator statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStats {
    pub heap_size: u32,
    pub total_allocated: u64,
    pub total_freed: u64,
    pub current_used: u64,
    pub total_free: u64,
    pub allocations_count: u64,
    pub frees_count: u64,
    /// `(1 - largest free block / total free) * 100`.
    pub fragmentation: f64,
    pub active_allocations: usize,
    pub memory_pools: usize,
}

/// Best-fit heap allocator.
#[derive(Debug, Clone)]
pub struct HeapAllocator {
    start: u32,
    size: u32,
    free: Vec<(u32, u32)>,
    allocated: BTreeMap<u32, Block>,
    cells: BTreeMap<u32, u32>,
    pools: BTreeMap<String, MemoryPool>,
    total_allocated: u64,
    total_freed: u64,
    allocations_count: u64,
    frees_count: u64,
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_SIZE)
    }
}

/// Largest power of two not above `alignment` (1 for 0).
#[inline]
fn normalize_alignment(alignment: u32) -> u32 {
    if alignment <= 1 {
        1
    } else {
        1 << (31 - alignment.leading_zeros())
    }
}

impl HeapAllocator {
    /// Create a heap of `size` bytes starting at [`HEAP_START`].
    pub fn new(size: u32) -> Self {
        let size = size.min(u32::MAX - HEAP_START);
        Self {
            start: HEAP_START,
            size,
            free: if size > 0 { vec![(HEAP_START, size)] } else { Vec::new() },
            allocated: BTreeMap::new(),
            cells: BTreeMap::new(),
            pools: BTreeMap::new(),
            total_allocated: 0,
            total_freed: 0,
            allocations_count: 0,
            frees_count: 0,
        }
    }

    /// Allocate `size` bytes. Returns `None` for zero sizes or when no free
    /// block fits.
    pub fn allocate(&mut self, size: u32, alignment: u32, type_info: Option<TypeInfo>) -> Option<u32> {
        if size == 0 {
            return None;
        }

        let alignment = normalize_alignment(alignment);
        let aligned_size = align_up(size, alignment)?;

        // Best fit: smallest block that holds padding + size.
        let mut best: Option<(usize, u32, u32)> = None;
        for (i, &(addr, len)) in self.free.iter().enumerate() {
            let Some(aligned_addr) = align_up(addr, alignment) else {
                continue;
            };
            let needed = (aligned_addr - addr) as u64 + aligned_size as u64;
            if (len as u64) < needed {
                continue;
            }
            if best.map_or(true, |(_, _, best_len)| len < best_len) {
                best = Some((i, aligned_addr, len));
            }
        }

        let Some((i, aligned_addr, _)) = best else {
            log::warn!("heap exhausted: {} bytes (align {}) requested", size, alignment);
            return None;
        };

        let (addr, len) = self.free.remove(i);
        let padding = aligned_addr - addr;
        let tail = len - padding - aligned_size;
        if padding > 0 {
            self.free.push((addr, padding));
        }
        if tail > 0 {
            self.free.push((aligned_addr + aligned_size, tail));
        }
        self.coalesce();

        self.allocated.insert(
            aligned_addr,
            Block {
                size: aligned_size,
                alignment,
                type_info,
            },
        );
        self.total_allocated += aligned_size as u64;
        self.allocations_count += 1;

        log::trace!("alloc 0x{:08X} ({} bytes)", aligned_addr, aligned_size);
        Some(aligned_addr)
    }

    /// Free an allocation. Returns `false` if `address` is not allocated.
    pub fn deallocate(&mut self, address: u32) -> bool {
        let Some(block) = self.allocated.remove(&address) else {
            log::debug!("free of unallocated address 0x{:08X}", address);
            return false;
        };

        self.free.push((address, block.size));
        self.coalesce();
        self.total_freed += block.size as u64;
        self.frees_count += 1;
        true
    }

    /// Resize an allocation.
    ///
    /// Shrinks in place, grows in place when the next free block is adjacent
    /// and large enough, otherwise moves the allocation and copies its cells.
    /// A new size of 0 frees the allocation.
    pub fn reallocate(&mut self, address: u32, new_size: u32) -> Option<u32> {
        let block = self.allocated.get(&address)?.clone();

        if new_size == 0 {
            self.deallocate(address);
            return None;
        }

        let new_aligned = align_up(new_size, block.alignment)?;

        if new_aligned <= block.size {
            let tail = block.size - new_aligned;
            if tail > 0 {
                self.free.push((address + new_aligned, tail));
                self.coalesce();
                self.total_freed += tail as u64;
            }
            if let Some(b) = self.allocated.get_mut(&address) {
                b.size = new_aligned;
            }
            return Some(address);
        }

        let extra = new_aligned - block.size;
        let end = address + block.size;
        if let Some(i) = self.free.iter().position(|&(a, len)| a == end && len >= extra) {
            let (a, len) = self.free[i];
            if len == extra {
                self.free.remove(i);
            } else {
                self.free[i] = (a + extra, len - extra);
            }
            if let Some(b) = self.allocated.get_mut(&address) {
                b.size = new_aligned;
            }
            self.total_allocated += extra as u64;
            log::trace!("realloc 0x{:08X} grown in place to {} bytes", address, new_aligned);
            return Some(address);
        }

        let new_address = self.allocate(new_aligned, block.alignment, block.type_info.clone())?;
        let moved: Vec<(u32, u32)> = self
            .cells
            .range(address..end)
            .map(|(a, v)| (new_address + (a - address), *v))
            .collect();
        self.cells.extend(moved);
        self.deallocate(address);
        log::trace!("realloc 0x{:08X} moved to 0x{:08X}", address, new_address);
        Some(new_address)
    }

    /// Read a cell (0 if never written).
    #[inline]
    pub fn read(&self, address: u32) -> u32 {
        self.cells.get(&address).copied().unwrap_or(0)
    }

    /// Write a cell.
    #[inline]
    pub fn write(&mut self, address: u32, value: u32) {
        self.cells.insert(address, value);
    }

    /// Metadata for the allocation starting at `address`.
    pub fn info(&self, address: u32) -> Option<AllocationInfo> {
        self.allocated.get(&address).map(|block| AllocationInfo {
            address,
            size: block.size,
            alignment: block.alignment,
            type_info: block.type_info.clone(),
        })
    }

    pub fn is_allocated(&self, address: u32) -> bool {
        self.allocated.contains_key(&address)
    }

    /// Whether `address` lies inside the heap range.
    pub fn validate_address(&self, address: u32) -> bool {
        address >= self.start && (address - self.start) < self.size
    }

    // ========================================================================
    // Pools
    // ========================================================================

    /// Create a pool of `blocks` blocks of `block_size` bytes, aligned to the
    /// block size.
    pub fn create_pool(&mut self, name: &str, block_size: u32, blocks: u32) -> Result<u32, PoolError> {
        if self.pools.contains_key(name) {
            return Err(PoolError::Exists(name.to_string()));
        }
        let bytes = block_size.saturating_mul(blocks);
        let address = self
            .allocate(bytes, block_size, None)
            .ok_or_else(|| PoolError::OutOfMemory {
                name: name.to_string(),
                bytes,
            })?;

        self.pools.insert(
            name.to_string(),
            MemoryPool {
                address,
                block_size,
                blocks,
                free: (0..blocks).collect(),
            },
        );
        log::debug!("pool '{}' created: {} x {} bytes at 0x{:08X}", name, blocks, block_size, address);
        Ok(address)
    }

    /// Take the lowest free block of a pool. `Ok(None)` when the pool is full.
    pub fn pool_allocate(&mut self, name: &str) -> Result<Option<u32>, PoolError> {
        let pool = self
            .pools
            .get_mut(name)
            .ok_or_else(|| PoolError::NotFound(name.to_string()))?;
        Ok(pool
            .free
            .pop_first()
            .map(|index| pool.address + index * pool.block_size))
    }

    /// Return a block to its pool.
    pub fn pool_release(&mut self, name: &str, address: u32) -> Result<(), PoolError> {
        let pool = self
            .pools
            .get_mut(name)
            .ok_or_else(|| PoolError::NotFound(name.to_string()))?;

        let bad = || PoolError::BadBlock {
            name: name.to_string(),
            address,
        };
        let offset = address.checked_sub(pool.address).ok_or_else(bad)?;
        if pool.block_size == 0 || offset % pool.block_size != 0 {
            return Err(bad());
        }
        let index = offset / pool.block_size;
        if index >= pool.blocks || !pool.free.insert(index) {
            return Err(bad());
        }
        Ok(())
    }

    pub fn pool(&self, name: &str) -> Option<&MemoryPool> {
        self.pools.get(name)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> MemoryStats {
        let total_free: u64 = self.free.iter().map(|(_, len)| *len as u64).sum();
        let largest = self.free.iter().map(|(_, len)| *len as u64).max().unwrap_or(0);
        let fragmentation = if total_free > 0 {
            (1.0 - largest as f64 / total_free as f64) * 100.0
        } else {
            0.0
        };

        MemoryStats {
            heap_size: self.size,
            total_allocated: self.total_allocated,
            total_freed: self.total_freed,
            current_used: self.total_allocated - self.total_freed,
            total_free,
            allocations_count: self.allocations_count,
            frees_count: self.frees_count,
            fragmentation,
            active_allocations: self.allocated.len(),
            memory_pools: self.pools.len(),
        }
    }

    /// Sort the free list and merge touching blocks.
    fn coalesce(&mut self) {
        self.free.sort_unstable_by_key(|(addr, _)| *addr);
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(self.free.len());
        for (addr, len) in self.free.drain(..) {
            match merged.last_mut() {
                Some((last_addr, last_len)) if *last_addr + *last_len == addr => *last_len += len,
                _ => merged.push((addr, len)),
            }
        }
        self.free = merged;
    }
}
