//! Assembly toolchain driver.
//!
//! Assembles a source file, then optionally runs it, disassembles it, or
//! writes the encoded program to disk.
//!
//! # Usage
//! ```text
//! stackvm <source.svm> [OPTIONS]
//! ```
//!
//! # Options
//! - `-r, --run`: execute the program
//! - `-s, --stats`: print execution statistics (with `-r`)
//! - `-d, --disasm`: print (or write with `-o`) the disassembly
//! - `-o, --output <file>`: write encoded bytecode (or disassembly with `-d`)
//! - `-M <i=v,...>`: preset memory cells before the run
//! - `-m <i,i,...>`: print memory cells after the run
//! - `--max-instr <n>`: instruction limit (default 100000)
//! - `--stack-size <n>`: operand stack limit (default 256)
//! - `--memory-size <n>`: memory cells (default 256)
//!
//! Malformed `-M`/`-m` entries are skipped with a warning; assembly,
//! execution, and I/O failures exit non-zero.

use stackvm::assembler::{render_diagnostic, Assembler};
use stackvm::disassembler::Disassembler;
use stackvm::memory::{Memory, SimpleMemory};
use stackvm::utils::log::Logger;
use stackvm::value::Value;
use stackvm::vm::{Config, ExecuteOptions, Vm};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

const DEFAULT_MAX_INSTRUCTIONS: u32 = 100_000;
const DEFAULT_STACK_SIZE: usize = 256;
const DEFAULT_MEMORY_SIZE: usize = 256;

struct Options {
    source: String,
    run: bool,
    stats: bool,
    disasm: bool,
    output: Option<String>,
    presets: Option<String>,
    inspect: Option<String>,
    max_instructions: u32,
    stack_size: usize,
    memory_size: usize,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let opts = parse_args(&args);
    let log = Logger::new("stackvm");

    if !Path::new(&opts.source).exists() {
        eprintln!("Input file does not exist: {}", opts.source);
        process::exit(1);
    }

    let program = match Assembler::new().assemble_file(&opts.source) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{}", render_diagnostic(&opts.source, &err));
            process::exit(1);
        }
    };

    if opts.disasm {
        let text = match Disassembler::new().disassemble(&program) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("Disassembly failed: {err}");
                process::exit(1);
            }
        };
        match &opts.output {
            Some(path) => write_file(path, text.as_bytes()),
            None => print!("{text}"),
        }
        return;
    }

    if let Some(path) = &opts.output {
        let bytes = program.to_bytes();
        write_file(path, &bytes);
        println!(
            "Compiled {} -> {} ({} bytes)",
            opts.source,
            path,
            bytes.len()
        );
        if !opts.run {
            return;
        }
    }

    if !opts.run {
        println!(
            "Assembled {} ({} instructions)",
            opts.source,
            program.len()
        );
        return;
    }

    let mut memory = SimpleMemory::new(opts.memory_size);
    if let Some(presets) = &opts.presets {
        apply_presets(&mut memory, presets, &log);
    }

    let mut vm = Vm::with_config(Config {
        stack_size: opts.stack_size,
        ..Config::default()
    });
    let exec_opts = ExecuteOptions {
        max_instructions: opts.max_instructions,
        ..ExecuteOptions::default()
    };
    let result = vm.execute(&program, &mut memory, &exec_opts);

    if opts.stats {
        println!("Instructions executed: {}", result.instruction_count);
        println!("Final stack depth:     {}", result.stack_depth);
        println!("Execution time:        {:?}", result.execution_time);
        println!("Halted:                {}", result.halted);
    }

    if let Some(fault) = &result.error {
        eprintln!("Execution failed: {fault}");
        process::exit(1);
    }

    if let Some(top) = vm.stack_top() {
        println!("Result: {top}");
    }

    if let Some(inspect) = &opts.inspect {
        inspect_memory(&memory, inspect, &log);
    }
}

fn parse_args(args: &[String]) -> Options {
    let mut opts = Options {
        source: args[1].clone(),
        run: false,
        stats: false,
        disasm: false,
        output: None,
        presets: None,
        inspect: None,
        max_instructions: DEFAULT_MAX_INSTRUCTIONS,
        stack_size: DEFAULT_STACK_SIZE,
        memory_size: DEFAULT_MEMORY_SIZE,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-r" | "--run" => opts.run = true,
            "-s" | "--stats" => opts.stats = true,
            "-d" | "--disasm" => opts.disasm = true,
            k @ ("-o" | "--output") => opts.output = Some(flag_value(args, &mut i, k)),
            k @ "-M" => opts.presets = Some(flag_value(args, &mut i, k)),
            k @ "-m" => opts.inspect = Some(flag_value(args, &mut i, k)),
            k @ "--max-instr" => {
                opts.max_instructions = parse_number(&flag_value(args, &mut i, k), k)
            }
            k @ "--stack-size" => opts.stack_size = parse_number(&flag_value(args, &mut i, k), k),
            k @ "--memory-size" => opts.memory_size = parse_number(&flag_value(args, &mut i, k), k),
            other => {
                eprintln!("Unexpected argument: {other}\n");
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 1;
    }

    opts
}

fn flag_value(args: &[String], i: &mut usize, flag: &str) -> String {
    *i += 1;
    if *i >= args.len() {
        eprintln!("{flag} requires an argument");
        process::exit(1);
    }
    args[*i].clone()
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    match value.parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            eprintln!("{flag} requires a number, got '{value}'");
            process::exit(1);
        }
    }
}

/// Applies `-M i=v,...` presets; malformed entries are skipped with a
/// warning and do not fail the run.
fn apply_presets(memory: &mut SimpleMemory, presets: &str, log: &Logger) {
    for entry in presets.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let parsed = entry.split_once('=').and_then(|(index, value)| {
            let index = index.trim().parse::<usize>().ok()?;
            let value = value.trim().parse::<f64>().ok()?;
            Some((index, value))
        });
        match parsed {
            Some((index, value)) => {
                if memory.store(index, Value::Float(value)).is_err() {
                    log.warn(&format!("memory preset '{entry}' is out of bounds, skipping"));
                }
            }
            None => log.warn(&format!("malformed memory preset '{entry}', skipping")),
        }
    }
}

/// Prints `-m i,i,...` cells; malformed entries are skipped with a warning.
fn inspect_memory(memory: &SimpleMemory, inspect: &str, log: &Logger) {
    for entry in inspect.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.parse::<usize>() {
            Ok(index) => match memory.load(index) {
                Ok(value) => println!("memory[{index}] = {value}"),
                Err(_) => log.warn(&format!("memory index {index} is out of bounds, skipping")),
            },
            Err(_) => log.warn(&format!("malformed memory index '{entry}', skipping")),
        }
    }
}

fn write_file(path: &str, bytes: &[u8]) {
    if let Err(err) = fs::write(path, bytes) {
        eprintln!("Failed to write {path}: {err}");
        process::exit(1);
    }
}

const USAGE: &str = "\
Stack VM Toolchain

USAGE:
    {program} <source.svm> [OPTIONS]

ARGS:
    <source.svm>    Assembly source file

OPTIONS:
    -r, --run              Assemble and execute the program
    -s, --stats            Print execution statistics (with -r)
    -d, --disasm           Print (or write with -o) the disassembly
    -o, --output <file>    Write encoded bytecode (or disassembly with -d)
    -M <i=v,...>           Preset memory cells before the run
    -m <i,i,...>           Print memory cells after the run
        --max-instr <n>    Instruction limit (default 100000)
        --stack-size <n>   Operand stack limit (default 256)
        --memory-size <n>  Memory cells (default 256)
    -h, --help             Print this help message

EXAMPLES:
    # Run with statistics
    {program} program.svm -r -s

    # Seed memory, run, and inspect cells afterwards
    {program} program.svm -r -M \"0=10,1=20\" -m \"0,1,2\"

    # Write the portable binary form
    {program} program.svm -o program.bin
";

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
