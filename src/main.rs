//! neural-vm: interpreter for one-hot encoded instruction words

use anyhow::{bail, Context};
use std::env;
use std::path::Path;

use neural_vm::config::Config;
use neural_vm::interpreter::decode::WordDecoder;
use neural_vm::interpreter::engine::RunOutcome;
use neural_vm::interpreter::traits::Decoder;
use neural_vm::program::{binary, Program, ProgramRunner};

const USAGE: &str = "\
Usage:
  neural-vm run <program> [--max-cycles N] [--trace] [--stats]
  neural-vm check <manifest>
  neural-vm assemble <manifest> <out.nvw>
  neural-vm config

<program> is a TOML manifest or an NVMW binary container.";

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    match command.as_str() {
        "run" => run(&args[1..]),
        "check" => check(&args[1..]),
        "assemble" => assemble(&args[1..]),
        "config" => show_config(),
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }
}

/// Run a program and print its trace and expectation results.
fn run(args: &[String]) -> anyhow::Result<()> {
    let mut path = None;
    let mut max_cycles = None;
    let mut show_trace = false;
    let mut show_stats = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--trace" => show_trace = true,
            "--stats" => show_stats = true,
            "--max-cycles" => {
                let value = iter.next().context("--max-cycles needs a value")?;
                let cycles: u64 = value
                    .parse()
                    .with_context(|| format!("invalid --max-cycles value '{}'", value))?;
                max_cycles = Some(cycles);
            }
            flag if flag.starts_with('-') => bail!("unknown option '{}'", flag),
            file => path = Some(file),
        }
    }
    let Some(path) = path else {
        bail!("run: missing <program>\n\n{}", USAGE);
    };

    let program = Program::load(Path::new(path)).with_context(|| format!("failed to load {}", path))?;
    let name = program.display_name().to_string();
    let config = Config::get();

    let mut runner = ProgramRunner::new(program, config);
    if let Some(cycles) = max_cycles {
        runner = runner.with_max_cycles(cycles);
    }
    let result = runner.run();
    let report = &result.report;

    if show_trace {
        for record in &report.traces {
            println!("{}", record);
        }
        println!();
    }

    println!("{}: {} after {} cycle(s)", name, report.outcome, report.cycles);
    if let Some(deadlock) = &report.deadlock {
        println!("  {}", deadlock);
    }

    println!();
    println!("Threads");
    println!("=======");
    for thread in runner.engine().threads() {
        let state = if thread.active {
            thread.status.to_string()
        } else {
            "EXITED".to_string()
        };
        println!("  T{:<3} pc {:>5}  {:<22} {:?}", thread.id, thread.pc, state, thread.context.regs);
    }

    if show_stats {
        let machine = runner.engine().machine();
        let stats = report.stats;
        let locks = machine.sync.mutexes.aggregate_stats();
        let barriers = machine.sync.barriers.stats();
        let heap = machine.heap.stats();

        println!();
        println!("Statistics");
        println!("==========");
        println!("  Instructions:     {}", stats.executed);
        println!("  Blocked attempts: {}", stats.blocked);
        println!("  Not implemented:  {}", stats.not_implemented);
        println!("  Unsupported:      {}", stats.unsupported);
        println!(
            "  Mutexes:          {} ({} acquires, {} contended, {} failed unlocks)",
            machine.sync.mutexes.len(),
            locks.acquires,
            locks.contention_count,
            locks.failed_unlocks
        );
        println!(
            "  Barriers:         {} completed, max wait {} cycle(s)",
            barriers.completions, barriers.max_wait_cycles
        );
        println!(
            "  Heap:             {}/{} bytes in use, {} allocation(s), {:.1}% fragmented",
            heap.current_used, heap.heap_size, heap.active_allocations, heap.fragmentation
        );
        println!("  Objects:          {} instance(s)", machine.objects.instance_count());
    }

    if !result.failures.is_empty() {
        println!();
        for failure in &result.failures {
            println!("  FAIL {}", failure);
        }
        bail!("{} expectation(s) failed", result.failures.len());
    }
    if report.outcome == RunOutcome::Deadlocked {
        bail!("run stopped on deadlock");
    }
    Ok(())
}

/// Assemble a manifest and print its disassembly.
fn check(args: &[String]) -> anyhow::Result<()> {
    let [path] = args else {
        bail!("check: expected <manifest>\n\n{}", USAGE);
    };
    let program = Program::load(Path::new(path)).with_context(|| format!("failed to load {}", path))?;

    println!("{}: {} instruction(s)", program.display_name(), program.len());
    if let Some(cycles) = program.max_cycles {
        println!("Cycle budget: {}", cycles);
    }
    println!();

    let decoder = WordDecoder::new();
    for (pc, word) in program.words.iter().enumerate() {
        println!("  {:4}: {}", pc, decoder.decode(word));
    }

    if !program.expectations.is_empty() {
        println!();
        println!("Expectations:");
        for expectation in &program.expectations {
            println!("  {}", expectation);
        }
    }
    Ok(())
}

/// Assemble a manifest into an NVMW container.
fn assemble(args: &[String]) -> anyhow::Result<()> {
    let [input, output] = args else {
        bail!("assemble: expected <manifest> <out.nvw>\n\n{}", USAGE);
    };
    let program = Program::load(Path::new(input)).with_context(|| format!("failed to load {}", input))?;
    if !program.expectations.is_empty() || program.catalog.class_count() + program.catalog.struct_count() > 0 {
        log::warn!("{}: schemas and expectations are not stored in the container", input);
    }

    let data = binary::encode(&program.words);
    std::fs::write(output, &data).with_context(|| format!("failed to write {}", output))?;
    println!("Wrote {} word(s), {} bytes to {}", program.len(), data.len(), output);
    Ok(())
}

/// Print the effective configuration.
fn show_config() -> anyhow::Result<()> {
    let config = Config::get();

    println!("Configuration");
    println!("=============");
    match Config::user_config_path() {
        Some(path) => println!("User config:       {}", path.display()),
        None => println!("User config:       (no config directory)"),
    }
    println!("max_cycles:        {}", config.max_cycles());
    println!("heap_size:         {}", config.heap_size());
    println!("stop_on_deadlock:  {}", config.stop_on_deadlock());
    println!("progress_interval: {}", config.progress_interval());
    println!();
    println!("Sample config:");
    println!();
    print!("{}", Config::sample_config());
    Ok(())
}
