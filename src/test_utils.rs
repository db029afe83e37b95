//! Shared helpers for VM testing.

use crate::assembler::assemble;
use crate::memory::{Memory, SimpleMemory};
use crate::value::Value;
use crate::vm::{ExecResult, ExecuteOptions, Vm};

/// Assembles a source snippet and runs it on a fresh VM with a 256-cell
/// memory, panicking on assembly failure.
pub fn assemble_and_run(source: &str, opts: &ExecuteOptions) -> (Vm, SimpleMemory, ExecResult) {
    let program = assemble(source).expect("assembly failed");
    let mut vm = Vm::new();
    let mut memory = SimpleMemory::new(256);
    let result = vm.execute(&program, &mut memory, opts);
    (vm, memory, result)
}

/// A table-driven program test case.
pub struct ProgramCase {
    pub name: &'static str,
    pub source: &'static str,
    pub expected_stack_depth: usize,
    /// Cells expected to hold these floats after the run.
    pub expected_memory: &'static [(usize, f64)],
    pub expect_error: bool,
}

/// Runs a suite of program cases, asserting stack depth, memory contents,
/// and halt state for each.
pub fn run_cases(cases: &[ProgramCase]) {
    for case in cases {
        let (_vm, memory, result) = assemble_and_run(case.source, &ExecuteOptions::default());

        if case.expect_error {
            assert!(result.error.is_some(), "{}: expected an error", case.name);
            continue;
        }

        assert!(
            result.is_ok(),
            "{}: unexpected fault: {:?}",
            case.name,
            result.error
        );
        assert!(result.halted, "{}: expected halt", case.name);
        assert_eq!(
            result.stack_depth, case.expected_stack_depth,
            "{}: stack depth",
            case.name
        );
        for &(index, expected) in case.expected_memory {
            assert_eq!(
                memory.load(index).unwrap(),
                Value::Float(expected),
                "{}: memory[{index}]",
                case.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_case_table() {
        run_cases(&[
            ProgramCase {
                name: "push and halt",
                source: "PUSH 42\nHALT",
                expected_stack_depth: 1,
                expected_memory: &[],
                expect_error: false,
            },
            ProgramCase {
                name: "store result",
                source: "PUSH 6\nPUSH 7\nMUL\nSTORE 0\nHALT",
                expected_stack_depth: 0,
                expected_memory: &[(0, 42.0)],
                expect_error: false,
            },
            ProgramCase {
                name: "countdown loop",
                source: "\
PUSH 3
loop:
DEC
DUP
JMPNZ loop
STORE 1
HALT
",
                expected_stack_depth: 0,
                expected_memory: &[(1, 0.0)],
                expect_error: false,
            },
            ProgramCase {
                name: "underflow faults",
                source: "POP\nHALT",
                expected_stack_depth: 0,
                expected_memory: &[],
                expect_error: true,
            },
        ]);
    }

    #[test]
    fn assemble_and_run_reports_state() {
        let (vm, _memory, result) = assemble_and_run("PUSHI 9\nHALT", &ExecuteOptions::default());
        assert!(result.is_ok());
        assert_eq!(vm.stack_top(), Some(&Value::Int(9)));
    }
}
