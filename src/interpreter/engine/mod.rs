//! Multi-threaded interpreter engine.
//!
//! The `InterpreterEngine` runs one instruction stream on a cooperative
//! thread list. It owns the [`Machine`](crate::interpreter::machine::Machine),
//! decodes words, hands them to the executor and records one
//! [`TraceRecord`] per executed instruction.
//!
//! # Execution Model
//!
//! Threads run "conceptually in parallel": each cycle gives every runnable
//! thread one instruction, in ascending thread id order. A blocked thread is
//! skipped until it is woken and then retries the instruction it blocked on.
//! A thread whose pc leaves the program is retired without a trace record.
//!
//! # Example
//!
//! ```
//! use neural_vm::interpreter::engine::{InterpreterEngine, RunOutcome};
//! use neural_vm::interpreter::state::Register;
//! use neural_vm::interpreter::word::{Operation, WordBuilder};
//! use neural_vm::memory::SimulatedHeap;
//!
//! let program = vec![
//!     WordBuilder::new(Operation::Mov).dest(Register::Eax).imm(40).build(),
//!     WordBuilder::new(Operation::Add).dest(Register::Eax).imm(2).build(),
//!     WordBuilder::new(Operation::Hlt).build(),
//! ];
//! let mut engine = InterpreterEngine::new(program, SimulatedHeap::default());
//!
//! let report = engine.run(1000);
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! assert_eq!(report.traces[1].result, 42);
//! ```

mod coordinator;
mod trace;

pub use coordinator::{EngineOptions, EngineStatus, InterpreterEngine, RunOutcome, RunReport};
pub use trace::{Operands, TraceRecord};
