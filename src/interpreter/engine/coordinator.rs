//! Cooperative scheduler.
//!
//! The engine owns the instruction stream and one [`Machine`]. Every cycle
//! it walks the threads that were active when the cycle began, in ascending
//! id order, and gives each schedulable one a single instruction.

use smallvec::SmallVec;
use std::fmt;

use crate::config::Config;
use crate::interpreter::decode::WordDecoder;
use crate::interpreter::execute::{Executor, ExecutorStats};
use crate::interpreter::machine::Machine;
use crate::interpreter::state::Thread;
use crate::interpreter::sync::{DeadlockDetector, DeadlockReport};
use crate::interpreter::traits::{Decoder, Heap};
use crate::interpreter::word::InstructionWord;
use crate::memory::SimulatedHeap;

use super::trace::TraceRecord;

/// Engine execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineStatus {
    /// No cycle has run yet.
    #[default]
    Ready,
    /// At least one thread is active.
    Running,
    /// Every thread has exited.
    Halted,
    /// The last `run` used its whole cycle budget.
    Exhausted,
    /// Every active thread is blocked and `stop_on_deadlock` is set.
    Deadlocked,
}

/// Scheduler knobs taken from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// End the run as soon as a deadlock is diagnosed.
    pub stop_on_deadlock: bool,
    /// Cycles between progress log lines; 0 disables them.
    pub progress_interval: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            stop_on_deadlock: false,
            progress_interval: 100,
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            stop_on_deadlock: config.stop_on_deadlock(),
            progress_interval: config.progress_interval(),
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No thread is active any more.
    Completed,
    /// The cycle budget ran out with threads still active.
    BudgetExhausted,
    /// Stopped early on a diagnosed deadlock.
    Deadlocked,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::BudgetExhausted => write!(f, "budget exhausted"),
            RunOutcome::Deadlocked => write!(f, "deadlocked"),
        }
    }
}

/// Result of [`InterpreterEngine::run`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Cycles executed by this run.
    pub cycles: u64,
    /// Trace records in execution order.
    pub traces: Vec<TraceRecord>,
    /// First deadlock diagnosed, if any.
    pub deadlock: Option<DeadlockReport>,
    pub stats: ExecutorStats,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// Scheduler over one instruction stream.
pub struct InterpreterEngine<H: Heap = SimulatedHeap> {
    program: Vec<InstructionWord>,
    machine: Machine<H>,
    decoder: Box<dyn Decoder>,
    executor: Executor,
    options: EngineOptions,
    status: EngineStatus,
    /// Total cycles executed.
    total_cycles: u64,
    /// Records not yet handed out by `run` or `take_traces`.
    traces: Vec<TraceRecord>,
    deadlock: Option<DeadlockReport>,
}

impl InterpreterEngine<SimulatedHeap> {
    /// Engine with a heap sized and options taken from `config`.
    pub fn from_config(program: Vec<InstructionWord>, config: &Config) -> Self {
        Self::new(program, SimulatedHeap::new(config.heap_size())).with_options(EngineOptions::from(config))
    }
}

impl<H: Heap> InterpreterEngine<H> {
    /// Create an engine whose main thread starts at pc 0.
    pub fn new(program: Vec<InstructionWord>, heap: H) -> Self {
        Self::with_machine(program, Machine::new(heap))
    }

    /// Create an engine over a prepared machine.
    pub fn with_machine(program: Vec<InstructionWord>, machine: Machine<H>) -> Self {
        Self {
            program,
            machine,
            decoder: Box::new(WordDecoder::new()),
            executor: Executor::new(),
            options: EngineOptions::default(),
            status: EngineStatus::Ready,
            total_cycles: 0,
            traces: Vec::new(),
            deadlock: None,
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the word decoder.
    pub fn with_decoder(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Get the engine status.
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// Get total cycles executed.
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn program(&self) -> &[InstructionWord] {
        &self.program
    }

    pub fn machine(&self) -> &Machine<H> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine<H> {
        &mut self.machine
    }

    pub fn threads(&self) -> &[Thread] {
        &self.machine.threads
    }

    pub fn thread(&self, id: usize) -> Option<&Thread> {
        self.machine.thread(id)
    }

    /// First deadlock diagnosed so far.
    pub fn deadlock(&self) -> Option<&DeadlockReport> {
        self.deadlock.as_ref()
    }

    pub fn executor_stats(&self) -> ExecutorStats {
        self.executor.stats()
    }

    /// Records buffered since the last `run` or `take_traces`.
    pub fn traces(&self) -> &[TraceRecord] {
        &self.traces
    }

    pub fn take_traces(&mut self) -> Vec<TraceRecord> {
        std::mem::take(&mut self.traces)
    }

    /// Execute one scheduler cycle.
    pub fn step(&mut self) {
        if matches!(self.status, EngineStatus::Halted | EngineStatus::Deadlocked) {
            return;
        }

        self.status = EngineStatus::Running;
        let cycle = self.total_cycles;
        self.machine.cycle = cycle;

        // Threads spawned during this cycle first run in the next one
        let active: SmallVec<[usize; 8]> = self
            .machine
            .threads
            .iter()
            .filter(|t| t.active)
            .map(|t| t.id)
            .collect();
        if active.is_empty() {
            self.status = EngineStatus::Halted;
            return;
        }

        for tid in active {
            if !self.machine.is_schedulable(tid) {
                continue;
            }

            let pc = self.machine.threads[tid].pc;
            let word = usize::try_from(pc).ok().and_then(|index| self.program.get(index));
            let Some(word) = word else {
                log::debug!("T{} left the program at pc {}", tid, pc);
                self.machine.deactivate(tid);
                continue;
            };

            let instr = self.decoder.decode(word);
            let outcome = self.executor.execute(&mut self.machine, tid, &instr, pc);

            let thread = &mut self.machine.threads[tid];
            let record = TraceRecord::new(cycle, tid, pc, &instr, &outcome, thread.context.flags());
            log::trace!("{}", record);
            thread.pc = record.next_pc;
            self.traces.push(record);

            if outcome.is_halted() {
                self.machine.deactivate(tid);
            }
        }

        self.total_cycles += 1;
        if self.options.progress_interval > 0 && self.total_cycles % self.options.progress_interval == 0 {
            log::debug!(
                "cycle {}: {} active thread(s), {} instruction(s) executed",
                self.total_cycles,
                self.machine.active_count(),
                self.executor.stats().executed
            );
        }

        if self.machine.active_count() == 0 {
            self.status = EngineStatus::Halted;
            return;
        }
        self.check_deadlock(cycle);
    }

    /// Run for up to `max_cycles` cycles.
    ///
    /// Stops early once no thread is active, or on a deadlock when
    /// `stop_on_deadlock` is set. Buffered trace records move into the
    /// report.
    pub fn run(&mut self, max_cycles: u64) -> RunReport {
        let start = self.total_cycles;
        log::info!(
            "Running {} word(s), {} thread(s), budget {} cycle(s)",
            self.program.len(),
            self.machine.active_count(),
            max_cycles
        );

        while self.total_cycles - start < max_cycles {
            self.step();
            if matches!(self.status, EngineStatus::Halted | EngineStatus::Deadlocked) {
                break;
            }
        }

        let outcome = match self.status {
            EngineStatus::Halted => RunOutcome::Completed,
            EngineStatus::Deadlocked => RunOutcome::Deadlocked,
            _ if self.machine.active_count() == 0 => {
                self.status = EngineStatus::Halted;
                RunOutcome::Completed
            }
            _ => {
                self.status = EngineStatus::Exhausted;
                RunOutcome::BudgetExhausted
            }
        };

        let cycles = self.total_cycles - start;
        log::info!("Run {} after {} cycle(s)", outcome, cycles);

        RunReport {
            outcome,
            cycles,
            traces: self.take_traces(),
            deadlock: self.deadlock.clone(),
            stats: self.executor.stats(),
        }
    }

    /// Diagnose a stall once per run.
    fn check_deadlock(&mut self, cycle: u64) {
        if self.deadlock.is_some() {
            return;
        }
        let detector = DeadlockDetector::new(
            &self.machine.threads,
            &self.machine.sync.mutexes,
            &self.machine.sync.barriers,
        );
        let Some(report) = detector.detect(cycle) else {
            return;
        };

        log::warn!("{}", report);
        self.deadlock = Some(report);
        if self.options.stop_on_deadlock {
            self.status = EngineStatus::Deadlocked;
        }
    }
}
