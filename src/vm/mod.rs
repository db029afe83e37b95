//! The execution engine.
//!
//! [`Vm`] runs a [`Program`] against a borrowed [`Memory`] in a synchronous
//! fetch/decode/dispatch loop. A VM instance is single-threaded and
//! single-entrant: one execution at a time, `reset` (or the next `execute`)
//! restores the post-construction state.
//!
//! The main loop checks, in order, the instruction budget, the wall-clock
//! deadline, and the cancellation flag, then treats an out-of-range program
//! counter as natural termination. Cancellation and timeout are cooperative
//! with one-instruction granularity; handlers are never preempted.

mod context;
mod ops;
mod stack;

pub use self::context::ExecContext;

use crate::errors::{VmError, VmFault};
use crate::isa::{Instruction, Op};
use crate::memory::Memory;
use crate::program::Program;
use crate::registry::InstructionRegistry;
use self::stack::OperandStack;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default operand stack depth limit.
pub const DEFAULT_STACK_SIZE: usize = 256;
/// Default return-address stack depth limit.
pub const DEFAULT_CALL_STACK_SIZE: usize = 64;

/// Per-instance configuration.
#[derive(Clone)]
pub struct Config {
    /// Operand stack capacity (also the default depth limit).
    pub stack_size: usize,
    /// Return-address stack capacity for `CALL`/`RET`.
    pub call_stack_size: usize,
    /// Instruction limit applied when `ExecuteOptions.max_instructions`
    /// is zero (0 = unlimited).
    pub default_instr_limit: u32,
    /// Handlers for custom opcodes (`None` = standard instructions only).
    pub registry: Option<Arc<InstructionRegistry>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            call_stack_size: DEFAULT_CALL_STACK_SIZE,
            default_instr_limit: 0,
            registry: None,
        }
    }
}

/// Per-execution options.
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    /// Maximum instructions to execute (0 = the config default).
    pub max_instructions: u32,
    /// Operand stack depth limit (0 = the config stack size).
    pub max_stack_depth: usize,
    /// Wall-clock budget (zero = none). Measured monotonically.
    pub timeout: Duration,
    /// Cooperative cancellation flag, polled between instructions.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Execution statistics and outcome.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Instructions executed (including a failing one).
    pub instruction_count: u32,
    /// Final operand stack depth.
    pub stack_depth: usize,
    /// Wall-clock time spent in the loop.
    pub execution_time: Duration,
    /// True if execution ended via `HALT`, top-level `RET`, or running off
    /// the end of the program.
    pub halted: bool,
    /// First error, if any. Side effects performed before it are kept.
    pub error: Option<VmFault>,
}

impl ExecResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A stack-based bytecode interpreter.
pub struct Vm {
    config: Config,
    stack: OperandStack,
    call_stack: Vec<usize>,
    pc: usize,
    pc_moved: bool,
    halted: bool,
    instr_count: u32,
    user_data: HashMap<String, Value>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Creates a VM with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a VM with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        let stack = OperandStack::new(config.stack_size);
        Self {
            config,
            stack,
            call_stack: Vec::new(),
            pc: 0,
            pc_moved: false,
            halted: false,
            instr_count: 0,
            user_data: HashMap::new(),
        }
    }

    /// Runs a program to completion, fault, limit, timeout, or
    /// cancellation. State is reset on entry, so a VM can be reused
    /// back-to-back without an explicit [`reset`](Self::reset).
    pub fn execute(
        &mut self,
        program: &Program,
        memory: &mut dyn Memory,
        opts: &ExecuteOptions,
    ) -> ExecResult {
        let start = Instant::now();
        self.reset();

        let max_instructions = if opts.max_instructions == 0 {
            self.config.default_instr_limit
        } else {
            opts.max_instructions
        };
        let max_depth = if opts.max_stack_depth == 0 {
            self.config.stack_size
        } else {
            opts.max_stack_depth
        };
        self.stack.set_limit(max_depth);

        let deadline = (opts.timeout > Duration::ZERO).then(|| start + opts.timeout);
        let instructions = program.instructions();

        while !self.halted {
            if max_instructions > 0 && self.instr_count >= max_instructions {
                return self.faulted(
                    start,
                    instructions,
                    VmError::InstructionLimit {
                        limit: max_instructions,
                    },
                );
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return self.faulted(start, instructions, VmError::Timeout);
                }
            }

            if let Some(flag) = &opts.cancel {
                if flag.load(Ordering::Relaxed) {
                    return self.faulted(start, instructions, VmError::Cancelled);
                }
            }

            // Running off the end of the program is a normal halt.
            if self.pc >= instructions.len() {
                self.halted = true;
                break;
            }

            let instruction = instructions[self.pc];
            self.instr_count = self.instr_count.saturating_add(1);
            self.pc_moved = false;

            if let Err(kind) = self.dispatch(instruction, memory) {
                return self.faulted(start, instructions, kind);
            }

            if !self.halted && !self.pc_moved {
                self.pc += 1;
            }
        }

        ExecResult {
            instruction_count: self.instr_count,
            stack_depth: self.stack.depth(),
            execution_time: start.elapsed(),
            halted: true,
            error: None,
        }
    }

    /// Restores the post-construction state.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.stack.set_limit(self.config.stack_size);
        self.call_stack.clear();
        self.pc = 0;
        self.pc_moved = false;
        self.halted = false;
        self.instr_count = 0;
        self.user_data.clear();
    }

    /// The operand stack, top last. Useful for inspecting results.
    pub fn stack(&self) -> &[Value] {
        self.stack.values()
    }

    /// The value on top of the operand stack, if any.
    pub fn stack_top(&self) -> Option<&Value> {
        self.stack.values().last()
    }

    fn faulted(
        &self,
        start: Instant,
        instructions: &[Instruction],
        kind: VmError,
    ) -> ExecResult {
        let opcode = instructions
            .get(self.pc)
            .map(|instruction| instruction.opcode)
            .unwrap_or(0);
        ExecResult {
            instruction_count: self.instr_count,
            stack_depth: self.stack.depth(),
            execution_time: start.elapsed(),
            halted: self.halted,
            error: Some(VmFault {
                kind,
                pc: self.pc,
                opcode,
                instruction_count: self.instr_count,
                stack_depth: self.stack.depth(),
                message: None,
            }),
        }
    }

    fn dispatch(
        &mut self,
        instruction: Instruction,
        memory: &mut dyn Memory,
    ) -> Result<(), VmError> {
        match instruction.op() {
            Some(op) => self.exec_standard(op, instruction.operand, memory),
            None if instruction.is_custom() => self.exec_custom(instruction, memory),
            None => Err(VmError::InvalidInstruction {
                opcode: instruction.opcode,
            }),
        }
    }

    fn exec_standard(
        &mut self,
        op: Op,
        operand: i32,
        memory: &mut dyn Memory,
    ) -> Result<(), VmError> {
        match op {
            // Stack
            Op::Push => self.stack.push(Value::Float(operand as f64)),
            Op::Pushi => self.stack.push(Value::Int(operand as i64)),
            Op::Pop => self.stack.pop().map(|_| ()),
            Op::Dup => {
                let top = self.stack.peek()?.clone();
                self.stack.push(top)
            }
            Op::Swap => self.stack.swap_top(),
            Op::Over => {
                let second = self.stack.peek_n(1)?.clone();
                self.stack.push(second)
            }
            Op::Rot => self.stack.rot(),

            // Arithmetic
            Op::Add => self.binary_float(|a, b| a + b),
            Op::Sub => self.binary_float(|a, b| a - b),
            Op::Mul => self.binary_float(|a, b| a * b),
            Op::Div => self.op_div(),
            Op::Mod => self.op_mod(),
            Op::Neg => self.unary_float(|a| -a),
            Op::Abs => self.unary_float(f64::abs),
            Op::Inc => self.unary_float(|a| a + 1.0),
            Op::Dec => self.unary_float(|a| a - 1.0),

            // Logic
            Op::And => self.binary_logic(|a, b| a && b),
            Op::Or => self.binary_logic(|a, b| a || b),
            Op::Not => self.op_not(),
            Op::Xor => self.binary_logic(|a, b| a ^ b),

            // Comparison
            Op::Eq => self.op_eq(false),
            Op::Ne => self.op_eq(true),
            Op::Gt => self.compare_float(|a, b| a > b),
            Op::Lt => self.compare_float(|a, b| a < b),
            Op::Ge => self.compare_float(|a, b| a >= b),
            Op::Le => self.compare_float(|a, b| a <= b),

            // Memory
            Op::Load => self.op_load(operand, memory),
            Op::Store => self.op_store(operand, memory),
            Op::Loadd => self.op_loadd(memory),
            Op::Stored => self.op_stored(memory),

            // Control flow
            Op::Jmp => self.branch(operand),
            Op::Jmpz => {
                let condition = self.stack.pop()?;
                if !condition.is_truthy() {
                    self.branch(operand)?;
                }
                Ok(())
            }
            Op::Jmpnz => {
                let condition = self.stack.pop()?;
                if condition.is_truthy() {
                    self.branch(operand)?;
                }
                Ok(())
            }
            Op::Call => self.op_call(operand),
            Op::Ret => self.op_ret(),
            Op::Halt => {
                self.halted = true;
                Ok(())
            }
            Op::Nop => Ok(()),

            // Math
            Op::Sqrt => self.unary_float(f64::sqrt),
            Op::Sin => self.unary_float(f64::sin),
            Op::Cos => self.unary_float(f64::cos),
            Op::Tan => self.unary_float(f64::tan),
            Op::Asin => self.unary_float(f64::asin),
            Op::Acos => self.unary_float(f64::acos),
            Op::Atan => self.unary_float(f64::atan),
            Op::Atan2 => self.op_atan2(),
            Op::Log => self.unary_float(f64::ln),
            Op::Log10 => self.unary_float(f64::log10),
            Op::Exp => self.unary_float(f64::exp),
            Op::Pow => self.binary_float(f64::powf),
            Op::Min => self.binary_float(f64::min),
            Op::Max => self.binary_float(f64::max),
            Op::Floor => self.unary_float(f64::floor),
            Op::Ceil => self.unary_float(f64::ceil),
            Op::Round => self.unary_float(f64::round),
            Op::Trunc => self.unary_float(f64::trunc),
        }
    }

    fn exec_custom(
        &mut self,
        instruction: Instruction,
        memory: &mut dyn Memory,
    ) -> Result<(), VmError> {
        let handler = self
            .config
            .registry
            .as_ref()
            .and_then(|registry| registry.get(instruction.opcode));
        match handler {
            Some(handler) => {
                let mut ctx = ExecContext::new(self, memory);
                handler.execute(&mut ctx, instruction.operand)
            }
            None => Err(VmError::InvalidOpcode {
                opcode: instruction.opcode,
            }),
        }
    }

    /// Sets the program counter to an absolute target. A target past the
    /// end of the program terminates naturally on the next iteration.
    fn branch(&mut self, operand: i32) -> Result<(), VmError> {
        let target = usize::try_from(operand).map_err(|_| VmError::InvalidOperand {
            reason: format!("negative jump target {operand}"),
        })?;
        self.pc = target;
        self.pc_moved = true;
        Ok(())
    }

    fn op_call(&mut self, operand: i32) -> Result<(), VmError> {
        if self.call_stack.len() >= self.config.call_stack_size {
            return Err(VmError::StackOverflow);
        }
        self.call_stack.push(self.pc + 1);
        self.branch(operand)
    }

    /// Returns to the address saved by `CALL`; at top level (empty call
    /// stack) it halts instead.
    fn op_ret(&mut self) -> Result<(), VmError> {
        match self.call_stack.pop() {
            Some(return_address) => {
                self.pc = return_address;
                self.pc_moved = true;
                Ok(())
            }
            None => {
                self.halted = true;
                Ok(())
            }
        }
    }
}
