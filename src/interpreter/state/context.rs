//! Execution context and thread records.
//!
//! The `ExecutionContext` holds the register state a single thread mutates:
//! the register file and the condition flags. A `Thread` wraps one context
//! with its program counter, stack and scheduling status.

use super::registers::{Gpr, Register, RegisterFile};
use crate::interpreter::traits::Flags;
use std::fmt;

/// Register state of one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Register file.
    pub regs: RegisterFile,
    /// Condition flags.
    flags: Flags,
}

impl ExecutionContext {
    /// Create a new zeroed context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a register by name.
    #[inline]
    pub fn read(&self, reg: Register) -> u32 {
        self.regs.read(reg)
    }

    /// Write a register by name.
    #[inline]
    pub fn write(&mut self, reg: Register, value: u32) {
        self.regs.write(reg, value);
    }

    /// Read `reg` if given, otherwise the fallback register.
    #[inline]
    pub fn read_or(&self, reg: Option<Register>, fallback: Gpr) -> u32 {
        self.regs.read(reg.unwrap_or_else(|| fallback.into()))
    }

    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[inline]
    pub fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    #[inline]
    pub fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }

    /// Copy used for a spawned child: same registers and flags, EAX cleared.
    pub fn fork_child(&self) -> Self {
        let mut child = self.clone();
        child.regs.set(Gpr::Eax, 0);
        child
    }
}

/// Scheduling status of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadStatus {
    /// Eligible to run.
    #[default]
    Running,
    /// Waiting for a mutex to be unlocked.
    WaitingMutex(u32),
    /// Waiting for another thread to finish.
    BlockedOnJoin(usize),
    /// Waiting at a barrier.
    BlockedOnBarrier(u32),
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadStatus::Running => write!(f, "RUNNING"),
            ThreadStatus::WaitingMutex(id) => write!(f, "WAITING_MUTEX({})", id),
            ThreadStatus::BlockedOnJoin(target) => write!(f, "BLOCKED_ON_JOIN({})", target),
            ThreadStatus::BlockedOnBarrier(id) => write!(f, "BLOCKED_ON_BARRIER({})", id),
        }
    }
}

/// A logical thread of the VM.
#[derive(Debug, Clone)]
pub struct Thread {
    /// Thread id (its index in the thread list).
    pub id: usize,
    /// Program counter (index into the instruction stream).
    pub pc: i64,
    /// Register state.
    pub context: ExecutionContext,
    /// Shared call/data stack: CALL return addresses and PUSHed values.
    pub stack: Vec<i64>,
    /// False once the thread has exited.
    pub active: bool,
    /// Scheduling status.
    pub status: ThreadStatus,
}

impl Thread {
    /// Create the initial thread at pc 0.
    pub fn main() -> Self {
        Self::new(0, 0, ExecutionContext::new())
    }

    /// Create a running thread.
    pub fn new(id: usize, pc: i64, context: ExecutionContext) -> Self {
        Self {
            id,
            pc,
            context,
            stack: Vec::new(),
            active: true,
            status: ThreadStatus::Running,
        }
    }

    /// Active and not blocked.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && self.status == ThreadStatus::Running
    }

    /// Active but blocked on a mutex, join or barrier.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.active && self.status != ThreadStatus::Running
    }
}
