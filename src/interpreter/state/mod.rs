//! Per-thread processor state.
//!
//! | Item | Width | Purpose |
//! |------|-------|---------|
//! | EAX..EDI | 32-bit | General purpose, with 16/8-bit aliases |
//! | EIP, EFLAGS | 32-bit | Informational |
//! | CR0, CR1 | 32-bit | Control |
//! | ZF SF CF OF PF AF | 1-bit | Condition flags |
//!
//! # Example
//!
//! ```
//! use neural_vm::interpreter::state::{ExecutionContext, Register};
//!
//! let mut ctx = ExecutionContext::new();
//! ctx.write(Register::Eax, 0x1234);
//! ctx.write(Register::Al, 0xFF);
//! assert_eq!(ctx.read(Register::Eax), 0x12FF);
//! ```

mod context;
mod registers;

pub use context::{ExecutionContext, Thread, ThreadStatus};
pub use registers::{Gpr, RegView, Register, RegisterFile, NUM_REGS};
