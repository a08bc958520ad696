//! Neural-VM interpreter.
//!
//! Programs are streams of fixed-width float vectors. Each vector encodes one
//! instruction as one-hot activations: the strongest slot of each field
//! range selects the operation and its operands. The interpreter decodes a
//! word, executes it against the issuing thread and records the result.
//!
//! # Architecture
//!
//! The interpreter is organized into several submodules:
//!
//! - [`word`]: instruction word layout, operation table, word builder
//! - [`decode`]: word decoder
//! - [`state`]: registers, flags and thread records
//! - [`sync`]: mutexes, barriers, join wait sets, deadlock diagnosis
//! - [`machine`]: state of one VM instance
//! - [`execute`]: execution units and the opcode dispatcher
//! - [`engine`]: cooperative scheduler and trace records
//!
//! # Example
//!
//! ```
//! use neural_vm::interpreter::{InterpreterEngine, Operation, Register, WordBuilder};
//! use neural_vm::memory::SimulatedHeap;
//!
//! let program = vec![
//!     WordBuilder::new(Operation::Mov).dest(Register::Ecx).imm(3).build(),
//!     WordBuilder::new(Operation::Hlt).build(),
//! ];
//! let mut engine = InterpreterEngine::new(program, SimulatedHeap::default());
//!
//! engine.step(); // Execute one cycle on all threads
//! engine.run(1000); // Run for up to 1000 cycles
//! assert_eq!(engine.thread(0).unwrap().context.read(Register::Ecx), 3);
//! ```

pub mod decode;
pub mod engine;
pub mod execute;
pub mod machine;
pub mod state;
pub mod sync;
pub mod traits;
pub mod word;

// Re-export key types for convenience
pub use traits::{Decoder, ExecuteResult, Flags, Heap, SyscallHandler};

pub use decode::{DecodedInstruction, WordDecoder};
pub use engine::{EngineOptions, EngineStatus, InterpreterEngine, RunOutcome, RunReport, TraceRecord};
pub use execute::{Executor, ExecutorStats, Outcome};
pub use machine::Machine;
pub use state::{ExecutionContext, Register, Thread, ThreadStatus};
pub use sync::DeadlockReport;
pub use word::{InstructionWord, Operation, TypeTag, WordBuilder};
