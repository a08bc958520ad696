//! Program runner.
//!
//! Wraps an [`InterpreterEngine`] built from a [`Program`] and checks the
//! program's register expectations once the run ends.
//!
//! # Example
//!
//! ```
//! use neural_vm::config::Config;
//! use neural_vm::program::{Manifest, ProgramRunner};
//!
//! let program = Manifest::parse(r#"
//!     [[instructions]]
//!     op = "MOV"
//!     dest = "EBX"
//!     imm = 7
//!
//!     [[instructions]]
//!     op = "HLT"
//!
//!     [[expect]]
//!     register = "EBX"
//!     value = 7
//! "#)?.assemble()?;
//!
//! let mut runner = ProgramRunner::new(program, &Config::default());
//! let result = runner.run();
//! assert!(result.success());
//! # Ok::<(), neural_vm::program::ProgramError>(())
//! ```

use std::fmt;

use super::{Expectation, Program};
use crate::config::Config;
use crate::interpreter::engine::{EngineOptions, InterpreterEngine, RunReport};
use crate::interpreter::machine::Machine;
use crate::interpreter::state::Thread;
use crate::memory::SimulatedHeap;

/// An expectation the run did not meet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectationFailure {
    pub expectation: Expectation,
    /// Register value found, `None` if the thread was never created.
    pub actual: Option<u32>,
}

impl fmt::Display for ExpectationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actual {
            Some(actual) => write!(
                f,
                "expected {}, found {} (0x{:08X})",
                self.expectation, actual as i32, actual
            ),
            None => write!(f, "expected {}, thread T{} does not exist", self.expectation, self.expectation.thread),
        }
    }
}

/// Result of a program run.
#[derive(Debug, Clone)]
pub struct ProgramResult {
    pub report: RunReport,
    pub failures: Vec<ExpectationFailure>,
}

impl ProgramResult {
    /// Run completed and every expectation held.
    pub fn success(&self) -> bool {
        self.report.is_completed() && self.failures.is_empty()
    }
}

/// Compare final thread registers against `expectations`.
pub fn check_expectations(expectations: &[Expectation], threads: &[Thread]) -> Vec<ExpectationFailure> {
    expectations
        .iter()
        .filter_map(|expectation| {
            let actual = threads
                .get(expectation.thread)
                .map(|t| t.context.read(expectation.register));
            match actual {
                Some(value) if value == expectation.value as u32 => None,
                _ => Some(ExpectationFailure {
                    expectation: *expectation,
                    actual,
                }),
            }
        })
        .collect()
}

/// Runs one program.
pub struct ProgramRunner {
    engine: InterpreterEngine,
    expectations: Vec<Expectation>,
    max_cycles: u64,
}

impl ProgramRunner {
    /// Runner with heap size, options and budget from `config`; the
    /// program's own `max_cycles` wins over the configured one.
    pub fn new(program: Program, config: &Config) -> Self {
        let machine = Machine::new(SimulatedHeap::new(config.heap_size())).with_catalog(program.catalog);
        let engine =
            InterpreterEngine::with_machine(program.words, machine).with_options(EngineOptions::from(config));

        Self {
            engine,
            expectations: program.expectations,
            max_cycles: program.max_cycles.unwrap_or_else(|| config.max_cycles()),
        }
    }

    /// Override the cycle budget.
    pub fn with_max_cycles(mut self, max_cycles: u64) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn max_cycles(&self) -> u64 {
        self.max_cycles
    }

    /// Get a reference to the underlying engine.
    pub fn engine(&self) -> &InterpreterEngine {
        &self.engine
    }

    /// Get a mutable reference to the underlying engine.
    pub fn engine_mut(&mut self) -> &mut InterpreterEngine {
        &mut self.engine
    }

    /// Run until every thread exits or the budget runs out.
    pub fn run(&mut self) -> ProgramResult {
        let report = self.engine.run(self.max_cycles);
        let failures = check_expectations(&self.expectations, self.engine.threads());
        for failure in &failures {
            log::warn!("{}", failure);
        }
        ProgramResult { report, failures }
    }
}
